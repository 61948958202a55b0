#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Mailbox message-append core
//!
//! The part of an IMAP-style mail store that turns a message — fresh
//! off the wire, already staged on disk, or copied from another
//! mailbox — into a committed entry in the destination mailbox's
//! index: UID assignment, flag and annotation application, an optional
//! annotator callout, `\Seen` bookkeeping, and event emission. ACL
//! evaluation, mailbox naming/lookup, and wire protocol parsing are
//! all out of scope; this crate only gates against the rights and
//! parsed bodies it's handed.

mod acl;
mod annotation;
mod annotator;
mod config;
mod error;
mod events;
mod flag;
mod mailbox;
mod objectstore;
mod record;
mod seenstore;
mod seqset;
mod session;
mod stage;

pub use acl::Rights;
pub use annotation::{AnnotationKey, AnnotationStore, Annotations};
pub use annotator::{apply_directives, CalloutRequest, Directive};
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use events::{Event, EventQueue, EventType};
pub use flag::{FlagName, SystemFlags, UserFlagBits, UserFlagTable, MAX_USER_FLAGS};
pub use mailbox::{MailboxStore, ParsedBody};
pub use objectstore::ObjectStore;
pub use record::{ContentHash, ConversationId, IndexRecord};
pub use seenstore::{SeenAccumulator, SeenData, SeenDb, SeenStore};
pub use seqset::SeqSet;
pub use session::{check, AppendSession, SessionCollaborators};
pub use stage::{new_stage, remove_stage, Stage};
