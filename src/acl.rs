//! ACL rights bitmask
//!
//! A small bitset standing in for the project's raw integer ACL rights
//! (`ACL_LOOKUP`, `ACL_WRITE`, ... in the original). Sessions are handed a
//! caller-computed `Rights` value at `check`/`setup` time; this crate never
//! evaluates ACLs itself, it only gates operations against the bits it is
//! given.

use bitflags::bitflags;

bitflags! {
    /// Mailbox ACL rights relevant to appending and copying messages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Rights: u32 {
        /// Mailbox is visible in LIST/LSUB and `MailboxNonexistent` vs
        /// `PermissionDenied` is disambiguated by this bit.
        const LOOKUP     = 1 << 0;
        /// Read messages and their flags.
        const READ       = 1 << 1;
        /// Keep the `\Seen` flag persistent for this user.
        const SEEN       = 1 << 2;
        /// Set flags other than `\Seen` and `\Deleted`.
        const WRITE      = 1 << 3;
        /// Append/copy new messages into the mailbox.
        const INSERT     = 1 << 4;
        /// Perform the "post" right (unused by this crate, kept for parity
        /// with the full IMAP ACL right set).
        const POST       = 1 << 5;
        /// Create submailboxes (unused by this crate).
        const CREATE     = 1 << 6;
        /// Delete submailboxes (unused by this crate).
        const DELETEMBOX = 1 << 7;
        /// Set/clear the `\Deleted` flag and expunge.
        const DELETEMSG  = 1 << 8;
        /// Administer the mailbox's ACL (unused by this crate).
        const ADMIN      = 1 << 9;
    }
}

impl Rights {
    /// Rights an append session requires at minimum: visibility plus the
    /// ability to insert new messages.
    #[must_use]
    pub const fn append_default() -> Self {
        Self::LOOKUP.union(Self::INSERT)
    }
}
