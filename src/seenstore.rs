//! The per-user seen-state store contract, and the session-side
//! accumulator that feeds it
//!
//! Storage of the seen db itself (locking, the on-disk format) is out of
//! scope; this module declares the contract the append core calls at
//! commit time, plus `SeenAccumulator`, which implements the "internal
//! vs external" seen policy over the course of a session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::record::IndexRecord;
use crate::seqset::SeqSet;

/// One mailbox's row in a user's seen db: the UID set and the time it
/// was last touched.
#[derive(Debug, Clone)]
pub struct SeenData {
    pub seen_uids: SeqSet,
    pub lastchange: DateTime<Utc>,
}

/// An open, locked handle onto one user's seen db. Dropped (or
/// explicitly `close`d) to release the lock.
#[async_trait]
pub trait SeenDb: Send + Sync {
    /// Read the row for `mailbox_unique_id`, or an empty row if the
    /// mailbox has no prior entry.
    async fn read(&mut self, mailbox_unique_id: &str) -> Result<SeenData>;

    /// Durably write the row back.
    async fn write(&mut self, mailbox_unique_id: &str, data: &SeenData) -> Result<()>;

    /// Release the lock and flush.
    async fn close(&mut self) -> Result<()>;
}

/// Opens (creating if necessary) a user's seen db and takes its lock;
/// the returned handle covers the single read-modify-write cycle a
/// session performs at commit.
#[async_trait]
pub trait SeenStore: Send + Sync {
    async fn open_or_create(&self, userid: &str) -> Result<Box<dyn SeenDb>>;
}

/// Tracks `\Seen` state for one session: a mailbox is
/// either "internal-seen" (the flag lives on the record itself, and
/// behaves like any other system flag) or "external-seen" (the flag
/// lives in a per-user db, keyed by mailbox unique id, and is only
/// merged in at commit).
#[derive(Debug, Clone)]
pub struct SeenAccumulator {
    internal_seen: bool,
    pending: SeqSet,
}

impl SeenAccumulator {
    #[must_use]
    pub const fn new(internal_seen: bool) -> Self {
        Self { internal_seen, pending: SeqSet::new() }
    }

    #[must_use]
    pub const fn is_internal(&self) -> bool {
        self.internal_seen
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply the session's seen policy to a freshly appended or copied
    /// record. When the mailbox is internal-seen, set the bit on the
    /// record in place and return immediately, no accumulation needed.
    /// Otherwise, stage the UID for the commit-time merge.
    pub fn set_seen(&mut self, record: &mut IndexRecord) {
        if self.internal_seen {
            record.system_flags.insert(crate::flag::SystemFlags::SEEN);
        } else {
            self.pending.add(record.uid);
        }
    }

    /// Merge the session's accumulated UIDs into `existing`, stamping
    /// `lastchange`. A no-op (and not called) when `pending` is empty or
    /// `userid` is anonymous.
    #[must_use]
    pub fn merge(&self, existing: &SeenData, now: DateTime<Utc>) -> SeenData {
        let mut merged = existing.seen_uids.clone();
        merged.union_with(&self.pending);
        SeenData { seen_uids: merged, lastchange: now }
    }
}
