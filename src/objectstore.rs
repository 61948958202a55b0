//! The object-storage backend contract
//!
//! A content-addressed blob store, out of scope for this crate; `put`
//! is idempotent and adds a refcount on the content hash, so both
//! ingestion and copy call the same method.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::record::IndexRecord;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store (or bump the refcount of) the content at `path` for
    /// `record` in `mailbox`.
    async fn put(&self, mailbox: &str, record: &IndexRecord, path: &Path) -> Result<()>;
}
