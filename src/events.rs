//! Event queue emitted on successful commit
//!
//! The core only enqueues events; delivery is an external collaborator's
//! job. Events are dispatched in enqueue order only once
//! `AppendSession::commit` succeeds.

use crate::record::IndexRecord;

/// Which class of mboxevent notification a session emits, or none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    MessageNew,
    MessageAppend,
    MessageCopy,
    None,
}

/// A queued notification, ready for dispatch by the caller's event
/// delivery layer once the session commits.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventType,
    pub mailbox: String,
    pub record: IndexRecord,
    /// For `MessageCopy`, the originating record in the source mailbox.
    pub copied_from: Option<IndexRecord>,
    pub userid: String,
    /// `-1` placeholder meaning "recompute on delivery".
    pub numunseen: i64,
    /// Flag names actually applied (post-ACL-gating) to `record`,
    /// preserved for the event sink.
    pub applied_flags: Vec<String>,
}

impl Event {
    #[must_use]
    pub fn new(kind: EventType, mailbox: String, record: IndexRecord, userid: String) -> Self {
        Self {
            kind,
            mailbox,
            record,
            copied_from: None,
            userid,
            numunseen: -1,
            applied_flags: Vec::new(),
        }
    }
}

/// FIFO queue of events accumulated during a session, dispatched only on
/// a successful commit and discarded on abort.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: Vec<Event>,
}

impl EventQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drain the queue in enqueue order, for dispatch on commit.
    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
