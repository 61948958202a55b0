//! In-memory fakes for every external collaborator trait this crate
//! consumes: real enough to drive the append core end to end, without a
//! real mailbox store, annotation db, object store, or seen db behind
//! it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailbox_append_core::{
    AnnotationStore, Annotations, ContentHash, IndexRecord, MailboxStore, ObjectStore, Result,
    Rights, SeenData, SeenDb, SeenStore,
};

/// A fake mailbox store backed by a temp directory on disk (real files,
/// real hardlinks) and in-memory index/quota/flag-table state.
pub struct FakeMailbox {
    pub name: String,
    pub unique_id: String,
    pub rights: Rights,
    pub root: PathBuf,
    pub last_uid: u32,
    pub internal_seen: bool,
    pub archive_all: bool,
    pub quota_storage_used: i64,
    pub quota_message_used: i64,
    pending: Vec<IndexRecord>,
    committed: BTreeMap<u32, IndexRecord>,
    user_flags: mailbox_append_core::UserFlagTable,
    pub committed_count: u32,
}

impl FakeMailbox {
    #[must_use]
    pub fn new(name: &str, root: &Path) -> Self {
        Self {
            name: name.to_string(),
            unique_id: format!("{name}-uniqueid"),
            rights: Rights::append_default() | Rights::WRITE | Rights::DELETEMSG | Rights::SEEN,
            root: root.to_path_buf(),
            last_uid: 0,
            internal_seen: true,
            archive_all: false,
            quota_storage_used: 0,
            quota_message_used: 0,
            pending: Vec::new(),
            committed: BTreeMap::new(),
            user_flags: mailbox_append_core::UserFlagTable::new(),
            committed_count: 0,
        }
    }

    #[must_use]
    pub fn with_rights(mut self, rights: Rights) -> Self {
        self.rights = rights;
        self
    }

    #[must_use]
    pub fn get(&self, uid: u32) -> Option<&IndexRecord> {
        self.committed.get(&uid)
    }

    /// Seed an already-committed record directly, bypassing a full
    /// append session — used to set up a source mailbox for copy tests.
    pub fn insert_committed(&mut self, record: IndexRecord) {
        self.last_uid = self.last_uid.max(record.uid);
        self.committed.insert(record.uid, record);
    }
}

#[async_trait]
impl MailboxStore for FakeMailbox {
    fn name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn rights(&self) -> Rights {
        self.rights
    }

    fn last_uid(&self) -> u32 {
        self.last_uid
    }

    fn internal_seen(&self, _userid: &str) -> bool {
        self.internal_seen
    }

    fn stage_dir(&self) -> PathBuf {
        self.root.join("stage")
    }

    fn record_filename(&self, record: &IndexRecord) -> PathBuf {
        self.root.join("records").join(record.uid.to_string())
    }

    async fn quota_check(&self, storage_floor: Option<i64>, message_floor: Option<i64>) -> Result<()> {
        if let Some(floor) = storage_floor {
            if self.quota_storage_used >= floor {
                return Err(mailbox_append_core::Error::QuotaExceeded {
                    mailbox: self.name.clone(),
                    resource: "storage".to_string(),
                });
            }
        }
        if let Some(floor) = message_floor {
            if self.quota_message_used >= floor {
                return Err(mailbox_append_core::Error::QuotaExceeded {
                    mailbox: self.name.clone(),
                    resource: "message".to_string(),
                });
            }
        }
        Ok(())
    }

    async fn copy_or_link(&self, src: &Path, dst: &Path, nolink: bool) -> Result<()> {
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let _ = tokio::fs::remove_file(dst).await;
        if nolink {
            tokio::fs::copy(src, dst).await?;
        } else if tokio::fs::hard_link(src, dst).await.is_err() {
            tokio::fs::copy(src, dst).await?;
        }
        Ok(())
    }

    async fn append_index_record(&mut self, record: IndexRecord) -> Result<()> {
        self.pending.push(record);
        Ok(())
    }

    async fn cache_record(&self, uid: u32) -> Result<IndexRecord> {
        self.committed
            .get(&uid)
            .cloned()
            .ok_or_else(|| mailbox_append_core::Error::MailboxNonexistent(format!("no such uid {uid}")))
    }

    fn should_archive(&self, _record: &IndexRecord) -> bool {
        self.archive_all
    }

    fn user_flag_lookup_or_alloc(&mut self, name: &str) -> Option<u32> {
        self.user_flags.lookup_or_alloc(name)
    }

    fn user_flag_name(&self, slot: u32) -> Option<String> {
        self.user_flags.name_of(slot).map(str::to_string)
    }

    fn mark_appended(&mut self, _when: DateTime<Utc>) {}

    async fn commit(&mut self) -> Result<()> {
        for record in self.pending.drain(..) {
            self.last_uid = self.last_uid.max(record.uid);
            self.committed_count += 1;
            self.committed.insert(record.uid, record);
        }
        Ok(())
    }
}

/// A mailbox whose `commit` always fails, for exercising the
/// IOERROR-severity commit-failure path.
pub struct FailingCommitMailbox {
    pub inner: FakeMailbox,
}

#[async_trait]
impl MailboxStore for FailingCommitMailbox {
    fn name(&self) -> &str {
        self.inner.name()
    }
    fn unique_id(&self) -> &str {
        self.inner.unique_id()
    }
    fn rights(&self) -> Rights {
        self.inner.rights()
    }
    fn last_uid(&self) -> u32 {
        self.inner.last_uid()
    }
    fn internal_seen(&self, userid: &str) -> bool {
        self.inner.internal_seen(userid)
    }
    fn stage_dir(&self) -> PathBuf {
        self.inner.stage_dir()
    }
    fn record_filename(&self, record: &IndexRecord) -> PathBuf {
        self.inner.record_filename(record)
    }
    async fn quota_check(&self, storage_floor: Option<i64>, message_floor: Option<i64>) -> Result<()> {
        self.inner.quota_check(storage_floor, message_floor).await
    }
    async fn copy_or_link(&self, src: &Path, dst: &Path, nolink: bool) -> Result<()> {
        self.inner.copy_or_link(src, dst, nolink).await
    }
    async fn append_index_record(&mut self, record: IndexRecord) -> Result<()> {
        self.inner.append_index_record(record).await
    }
    async fn cache_record(&self, uid: u32) -> Result<IndexRecord> {
        self.inner.cache_record(uid).await
    }
    fn should_archive(&self, record: &IndexRecord) -> bool {
        self.inner.should_archive(record)
    }
    fn user_flag_lookup_or_alloc(&mut self, name: &str) -> Option<u32> {
        self.inner.user_flag_lookup_or_alloc(name)
    }
    fn user_flag_name(&self, slot: u32) -> Option<String> {
        self.inner.user_flag_name(slot)
    }
    fn mark_appended(&mut self, when: DateTime<Utc>) {
        self.inner.mark_appended(when);
    }
    async fn commit(&mut self) -> Result<()> {
        Err(mailbox_append_core::Error::Io(std::io::Error::other("simulated index-commit failure")))
    }
}

/// A no-op annotation store that records what was stored, for asserting
/// disjointness between user- and system-annotations.
#[derive(Default)]
pub struct FakeAnnotationStore {
    pub is_admin: Mutex<bool>,
    pub stored: Mutex<Vec<(u32, bool, Annotations)>>,
    pub copies: Mutex<Vec<(String, u32, u32)>>,
}

#[async_trait]
impl AnnotationStore for FakeAnnotationStore {
    fn set_auth(&mut self, is_admin: bool, _userid: &str) {
        *self.is_admin.lock().unwrap() = is_admin;
    }

    async fn store(&mut self, uid: u32, annotations: &Annotations) -> Result<()> {
        let is_admin = *self.is_admin.lock().unwrap();
        self.stored.lock().unwrap().push((uid, is_admin, annotations.clone()));
        Ok(())
    }

    async fn copy_from(&mut self, src_mailbox: &str, src_uid: u32, dst_uid: u32, _userid: &str) -> Result<()> {
        self.copies.lock().unwrap().push((src_mailbox.to_string(), src_uid, dst_uid));
        Ok(())
    }
}

/// An annotation store whose `store` call fails whenever the bound
/// auth matches `fail_when_admin` — used to exercise the two different
/// failure policies for user- vs system-annotation storage.
#[derive(Default)]
pub struct FailingAnnotationStore {
    pub fail_when_admin: bool,
    is_admin: Mutex<bool>,
}

impl FailingAnnotationStore {
    #[must_use]
    pub fn new(fail_when_admin: bool) -> Self {
        Self { fail_when_admin, is_admin: Mutex::new(false) }
    }
}

#[async_trait]
impl AnnotationStore for FailingAnnotationStore {
    fn set_auth(&mut self, is_admin: bool, _userid: &str) {
        *self.is_admin.lock().unwrap() = is_admin;
    }

    async fn store(&mut self, _uid: u32, _annotations: &Annotations) -> Result<()> {
        if *self.is_admin.lock().unwrap() == self.fail_when_admin {
            Err(mailbox_append_core::Error::Io(std::io::Error::other("annotation store unavailable")))
        } else {
            Ok(())
        }
    }

    async fn copy_from(&mut self, _src_mailbox: &str, _src_uid: u32, _dst_uid: u32, _userid: &str) -> Result<()> {
        Ok(())
    }
}

/// An object store that always succeeds, recording each `put`.
#[derive(Default)]
pub struct FakeObjectStore {
    pub puts: Mutex<Vec<(String, u32, ContentHash)>>,
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn put(&self, mailbox: &str, record: &IndexRecord, _path: &Path) -> Result<()> {
        let guid = record.guid.unwrap_or_else(|| ContentHash::of(b""));
        self.puts.lock().unwrap().push((mailbox.to_string(), record.uid, guid));
        Ok(())
    }
}

/// An object store that always fails `put`, for exercising the
/// clear-ARCHIVED-on-failure path.
pub struct FailingObjectStore;

#[async_trait]
impl ObjectStore for FailingObjectStore {
    async fn put(&self, _mailbox: &str, _record: &IndexRecord, _path: &Path) -> Result<()> {
        Err(mailbox_append_core::Error::Io(std::io::Error::other("object store unavailable")))
    }
}

/// An in-memory per-user seen db, keyed by (userid, mailbox unique id).
///
/// Holds its rows behind an `Arc<Mutex<_>>` so the `Box<dyn SeenDb>`
/// handle `open_or_create` hands back can outlive the borrow of `&self`
/// the trait signature allows.
#[derive(Default, Clone)]
pub struct FakeSeenStore {
    rows: Arc<Mutex<BTreeMap<(String, String), SeenData>>>,
}

pub struct FakeSeenDb {
    userid: String,
    rows: Arc<Mutex<BTreeMap<(String, String), SeenData>>>,
}

#[async_trait]
impl SeenDb for FakeSeenDb {
    async fn read(&mut self, mailbox_unique_id: &str) -> Result<SeenData> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .get(&(self.userid.clone(), mailbox_unique_id.to_string()))
            .cloned()
            .unwrap_or_else(|| SeenData { seen_uids: mailbox_append_core::SeqSet::new(), lastchange: Utc::now() }))
    }

    async fn write(&mut self, mailbox_unique_id: &str, data: &SeenData) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .insert((self.userid.clone(), mailbox_unique_id.to_string()), data.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SeenStore for FakeSeenStore {
    async fn open_or_create(&self, userid: &str) -> Result<Box<dyn SeenDb>> {
        Ok(Box::new(FakeSeenDb { userid: userid.to_string(), rows: Arc::clone(&self.rows) }))
    }
}
