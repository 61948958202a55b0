//! The mutated subset of an index record owned by an append session

use chrono::{DateTime, Utc};

use crate::flag::{SystemFlags, UserFlagBits};

/// An opaque content identity for a staged or finalized message, used as
/// both the single-instance-store key and the annotator's `GUID` field.
///
/// A SHA-256 digest of the message bytes stands in for the original's
/// project-specific `message_guid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    #[must_use]
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

/// The conversation id grouping related messages together. `None` is the
/// original's `NULLCONVERSATION`.
pub type ConversationId = Option<u64>;

/// The mutated subset of an index record: everything an append session
/// assigns or carries forward, short of the cache row and the rest of the
/// mailbox-owned header fields.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub uid: u32,
    pub internaldate: DateTime<Utc>,
    pub system_flags: SystemFlags,
    pub user_flags: UserFlagBits,
    pub conversation_id: ConversationId,
    pub cache_offset: u64,
    pub guid: Option<ContentHash>,
    pub size: u64,
}

impl IndexRecord {
    /// A freshly zeroed record for UID `uid`, matching `zero_index()`
    /// in the original followed by the UID/internaldate assignment every
    /// ingestion path performs first.
    #[must_use]
    pub fn new(uid: u32, internaldate: DateTime<Utc>) -> Self {
        Self {
            uid,
            internaldate,
            system_flags: SystemFlags::empty(),
            user_flags: UserFlagBits::empty(),
            conversation_id: None,
            cache_offset: 0,
            guid: None,
            size: 0,
        }
    }
}
