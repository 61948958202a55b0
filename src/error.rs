//! Error types for the append core

use thiserror::Error;

/// The single result kind every append operation propagates as.
#[derive(Error, Debug)]
pub enum Error {
    /// ACL lookup mismatch where LOOKUP was granted.
    #[error("permission denied on mailbox {mailbox}")]
    PermissionDenied { mailbox: String },

    /// ACL lookup mismatch without LOOKUP, or a missing mailbox.
    #[error("mailbox does not exist: {0}")]
    MailboxNonexistent(String),

    /// Some configured quota resource is below its floor.
    #[error("quota exceeded on mailbox {mailbox}: {resource}")]
    QuotaExceeded { mailbox: String, resource: String },

    /// Filesystem, socket, pipe, or timeout failure. Fatal for the
    /// current ingestion and therefore for the session.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Message parse failure. Fatal for the message.
    #[error("message parse error: {0}")]
    Parse(String),

    /// No free user-flag slot in the mailbox's 128-slot table.
    #[error("user flag table exhausted on mailbox {0}")]
    UserFlagsExhausted(String),
}

pub type Result<T> = std::result::Result<T, Error>;
