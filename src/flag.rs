//! System flags, user-flag table, and flag-name parsing
//!
//! The original C core keeps raw integer flag bitmasks. This rewrite
//! uses a bitset for system flags (`SystemFlags`) plus a sum type
//! (`FlagName`) for the symbolic names a caller or callout hands in.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// The fixed set of boolean system-flag bits on an index record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SystemFlags: u32 {
        const SEEN     = 1 << 0;
        const DELETED  = 1 << 1;
        const DRAFT    = 1 << 2;
        const FLAGGED  = 1 << 3;
        const ANSWERED = 1 << 4;
        const ARCHIVED = 1 << 5;
        /// Internal-only bit carried from the original record header;
        /// nothing in this crate sets it, kept for parity with the
        /// original `struct index_record` shape.
        const EXPUNGED = 1 << 6;
    }
}

/// Number of per-mailbox user-flag slots (the original allows 64-128;
/// this crate uses the documented maximum).
pub const MAX_USER_FLAGS: usize = 128;

/// A 128-bit set of user-flag slots, stored as four `u32` words so the
/// per-slot bit test matches the original `user_flags[slot/32] & (1<<(slot&31))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserFlagBits([u32; MAX_USER_FLAGS / 32]);

impl UserFlagBits {
    #[must_use]
    pub const fn empty() -> Self {
        Self([0; MAX_USER_FLAGS / 32])
    }

    pub fn set(&mut self, slot: u32) {
        let slot = slot as usize;
        self.0[slot / 32] |= 1 << (slot % 32);
    }

    #[must_use]
    pub fn is_set(&self, slot: u32) -> bool {
        let slot = slot as usize;
        self.0[slot / 32] & (1 << (slot % 32)) != 0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    pub fn clear(&mut self) {
        self.0 = [0; MAX_USER_FLAGS / 32];
    }

    /// Iterate the slots that are set.
    pub fn iter_set(&self) -> impl Iterator<Item = u32> + '_ {
        (0..MAX_USER_FLAGS as u32).filter(move |&slot| self.is_set(slot))
    }
}

/// A per-mailbox table mapping user-flag names to slot numbers.
///
/// Mirrors `mailbox->flagname[]` plus `mailbox_user_flag()`'s
/// allocate-or-lookup behavior. Names are matched case-insensitively but
/// the table itself is kept here (the table normally lives in the
/// mailbox header under its own lock; this crate treats
/// the table as the session's view of that header).
#[derive(Debug, Clone, Default)]
pub struct UserFlagTable {
    names: Vec<String>,
}

impl UserFlagTable {
    #[must_use]
    pub const fn new() -> Self {
        Self { names: Vec::new() }
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| i as u32)
    }

    #[must_use]
    pub fn name_of(&self, slot: u32) -> Option<&str> {
        self.names.get(slot as usize).map(String::as_str)
    }

    /// Look up `name`'s slot, allocating a new one if the table has room.
    ///
    /// Returns `None` if all `MAX_USER_FLAGS` slots are taken and `name`
    /// is not already present (the table is full).
    pub fn lookup_or_alloc(&mut self, name: &str) -> Option<u32> {
        if let Some(slot) = self.find(name) {
            return Some(slot);
        }
        if self.names.len() >= MAX_USER_FLAGS {
            return None;
        }
        self.names.push(name.to_string());
        Some((self.names.len() - 1) as u32)
    }
}

/// A symbolic flag name, as handed in by a caller or an annotator reply.
///
/// System flags (`\Seen`, `\Deleted`, ...) have dedicated variants;
/// anything else is a per-mailbox user-flag keyword.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlagName {
    Seen,
    Deleted,
    Draft,
    Flagged,
    Answered,
    User(String),
}

impl FlagName {
    /// Parse a flag name the way the callout wire protocol and the
    /// append caller both hand them in: case-insensitive, `\`-prefixed
    /// for system flags.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "\\seen" => Self::Seen,
            "\\deleted" => Self::Deleted,
            "\\draft" => Self::Draft,
            "\\flagged" => Self::Flagged,
            "\\answered" => Self::Answered,
            _ => Self::User(name.to_string()),
        }
    }

    #[must_use]
    pub fn as_imap_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Flagged => "\\Flagged",
            Self::Answered => "\\Answered",
            Self::User(name) => name,
        }
    }
}

impl fmt::Display for FlagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}
