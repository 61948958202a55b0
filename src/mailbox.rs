//! The mailbox store contract consumed by the append core
//!
//! The mailbox store itself — record allocation, cache records, index
//! append, quota accounting, copy-file link-or-copy, record filename
//! resolution — is out of scope. This module only declares
//! the operations the append core calls against it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::record::IndexRecord;

/// A locked mailbox handle. Implementors own the actual index file,
/// record storage, and lock; this crate only ever calls the methods
/// below, in setup/ingest/commit order.
#[async_trait]
pub trait MailboxStore: Send + Sync {
    /// The mailbox's name, for error messages and event payloads.
    fn name(&self) -> &str;

    /// A stable unique identifier for this mailbox, used as the seen-db
    /// key (distinct from `name`, which can be renamed).
    fn unique_id(&self) -> &str;

    /// The rights the invoking session has on this mailbox, computed
    /// once by the caller (ACL evaluation is out of scope for this crate).
    fn rights(&self) -> crate::acl::Rights;

    /// The highest UID currently assigned in this mailbox.
    fn last_uid(&self) -> u32;

    /// `true` if this mailbox/user combination stores `\Seen` on the
    /// record itself rather than in an external per-user seen db.
    fn internal_seen(&self, userid: &str) -> bool;

    /// The stage directory for this mailbox's storage partition.
    fn stage_dir(&self) -> PathBuf;

    /// Final on-disk path for `record`, once appended.
    fn record_filename(&self, record: &IndexRecord) -> PathBuf;

    /// Check the mailbox's configured quotas against the given floors.
    /// `None` for either floor means "don't care about that resource".
    async fn quota_check(
        &self,
        storage_floor: Option<i64>,
        message_floor: Option<i64>,
    ) -> Result<()>;

    /// Hard-link (or, if `nolink`, copy) `src` into `dst`.
    async fn copy_or_link(&self, src: &Path, dst: &Path, nolink: bool) -> Result<()>;

    /// Durably append `record` to the mailbox index. UIDs must arrive in
    /// increasing order; this is the point at which the record becomes
    /// visible to the mailbox's own readers (still pending `commit`).
    async fn append_index_record(&mut self, record: IndexRecord) -> Result<()>;

    /// Read back the cache row for an existing record by UID, before any
    /// mutation — used by the copy path so a same-mailbox copy still
    /// observes a pre-mutation view.
    async fn cache_record(&self, uid: u32) -> Result<IndexRecord>;

    /// Whether `record` should be archived immediately, per mailbox
    /// policy.
    fn should_archive(&self, record: &IndexRecord) -> bool;

    /// Look up (or allocate) the per-mailbox slot for a user-flag name.
    /// Returns `None` if the 128-slot table is full.
    fn user_flag_lookup_or_alloc(&mut self, name: &str) -> Option<u32>;

    /// The user-flag name bound to `slot`, if any.
    fn user_flag_name(&self, slot: u32) -> Option<String>;

    /// Stamp the mailbox's last-append timestamp and record a "mailbox
    /// changed" entry in the sync log.
    fn mark_appended(&mut self, when: DateTime<Utc>);

    /// Durably commit the mailbox index. On failure the mailbox may be
    /// left inconsistent; callers must treat this as a hard IO error.
    async fn commit(&mut self) -> Result<()>;
}

/// An already-parsed message body summary, supplied by the caller
/// (MIME body-tree construction is out of scope for this crate). Just
/// enough to build an index record and an annotator request.
#[derive(Debug, Clone)]
pub struct ParsedBody {
    pub size: u64,
    pub guid: crate::record::ContentHash,
    /// Opaque serialized header cache the mailbox store will persist
    /// alongside the index record.
    pub header_cache: Vec<u8>,
    /// Canonical serialized body tree at depth 2, for the annotator's
    /// `BODY` field.
    pub body_repr: String,
}
