//! The append session: setup, ingestion, commit/abort
//!
//! Orchestrates setup, per-message ingestion, and commit-or-abort over
//! the `from_stream`/`from_stage`/`copy` entry points. This is the one
//! type every caller drives directly; everything else in this crate
//! exists to support it.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::acl::Rights;
use crate::annotation::{Annotations, AnnotationStore};
use crate::annotator::{self, CalloutRequest};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::events::{Event, EventQueue, EventType};
use crate::flag::{FlagName, SystemFlags, UserFlagBits};
use crate::mailbox::{MailboxStore, ParsedBody};
use crate::objectstore::ObjectStore;
use crate::record::IndexRecord;
use crate::seenstore::{SeenAccumulator, SeenDb, SeenStore};
use crate::stage::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Ready,
    Done,
}

/// Either a mailbox handle the session owns outright (`setup`, closed
/// when the session itself drops) or one borrowed from the caller
/// (`setup_from_existing`, left open for the caller to close).
enum MailboxHandle<'m> {
    Owned(Box<dyn MailboxStore + 'm>),
    Borrowed(&'m mut dyn MailboxStore),
}

impl<'m> MailboxHandle<'m> {
    fn as_ref(&self) -> &dyn MailboxStore {
        match self {
            Self::Owned(b) => b.as_ref(),
            Self::Borrowed(r) => &**r,
        }
    }

    fn as_mut(&mut self) -> &mut dyn MailboxStore {
        match self {
            Self::Owned(b) => b.as_mut(),
            Self::Borrowed(r) => &mut **r,
        }
    }
}

/// Check ACL/quota gating without creating a session — a pure precheck
/// with no state change.
///
/// # Errors
///
/// `MailboxNonexistent` if `LOOKUP` is not granted, `PermissionDenied`
/// if `required` is not a subset of the mailbox's rights, or
/// `QuotaExceeded` if a configured floor is breached.
pub async fn check(mailbox: &dyn MailboxStore, required: Rights, config: &SessionConfig) -> Result<()> {
    gate_acl(mailbox.name(), mailbox.rights(), required)?;
    mailbox
        .quota_check(config.quota_storage_floor, config.quota_message_floor)
        .await
}

fn gate_acl(name: &str, granted: Rights, required: Rights) -> Result<()> {
    if !granted.contains(required) {
        if !granted.contains(Rights::LOOKUP) {
            return Err(Error::MailboxNonexistent(name.to_string()));
        }
        return Err(Error::PermissionDenied { mailbox: name.to_string() });
    }
    Ok(())
}

/// The unit of mutation: orchestrates setup, N ingestions
/// (`from_stream`, `from_stage`, `copy`), then a single `commit` or
/// `abort`.
pub struct AppendSession<'m> {
    mailbox: Option<MailboxHandle<'m>>,
    annotation_store: Box<dyn AnnotationStore + 'm>,
    object_store: Option<Box<dyn ObjectStore + 'm>>,
    seen_store: Option<Box<dyn SeenStore + 'm>>,
    config: SessionConfig,
    userid: String,
    rights: Rights,
    first_uid: u32,
    nummsg: u32,
    seen: SeenAccumulator,
    event_type: EventType,
    events: EventQueue,
    state: LifecycleState,
}

/// The external collaborators a session needs beyond the mailbox
/// itself, bundled so `setup`/`setup_from_existing` don't take an
/// unwieldy number of positional arguments.
pub struct SessionCollaborators<'m> {
    pub annotation_store: Box<dyn AnnotationStore + 'm>,
    pub object_store: Option<Box<dyn ObjectStore + 'm>>,
    pub seen_store: Option<Box<dyn SeenStore + 'm>>,
}

impl<'m> AppendSession<'m> {
    /// Open-and-write-lock a caller-supplied mailbox handle that this
    /// session will own (and therefore close when the session is
    /// dropped).
    ///
    /// # Errors
    ///
    /// Same as [`check`].
    pub async fn setup(
        mailbox: Box<dyn MailboxStore + 'm>,
        userid: impl Into<String>,
        required: Rights,
        config: SessionConfig,
        event_type: EventType,
        collaborators: SessionCollaborators<'m>,
    ) -> Result<Self> {
        Self::setup_with_handle(MailboxHandle::Owned(mailbox), userid, required, config, event_type, collaborators).await
    }

    /// The same gating and population as `setup`, but over a lock the
    /// caller already holds; this session never closes it.
    ///
    /// # Errors
    ///
    /// Same as [`check`].
    pub async fn setup_from_existing(
        mailbox: &'m mut dyn MailboxStore,
        userid: impl Into<String>,
        required: Rights,
        config: SessionConfig,
        event_type: EventType,
        collaborators: SessionCollaborators<'m>,
    ) -> Result<Self> {
        Self::setup_with_handle(MailboxHandle::Borrowed(mailbox), userid, required, config, event_type, collaborators).await
    }

    async fn setup_with_handle(
        handle: MailboxHandle<'m>,
        userid: impl Into<String>,
        required: Rights,
        config: SessionConfig,
        event_type: EventType,
        collaborators: SessionCollaborators<'m>,
    ) -> Result<Self> {
        let userid = userid.into();
        gate_acl(handle.as_ref().name(), handle.as_ref().rights(), required)?;
        handle
            .as_ref()
            .quota_check(config.quota_storage_floor, config.quota_message_floor)
            .await?;

        let internal_seen = handle.as_ref().internal_seen(&userid);
        let first_uid = handle.as_ref().last_uid() + 1;
        let rights = handle.as_ref().rights();

        Ok(Self {
            mailbox: Some(handle),
            annotation_store: collaborators.annotation_store,
            object_store: collaborators.object_store,
            seen_store: collaborators.seen_store,
            config,
            userid,
            rights,
            first_uid,
            nummsg: 0,
            seen: SeenAccumulator::new(internal_seen),
            event_type,
            events: EventQueue::new(),
            state: LifecycleState::Ready,
        })
    }

    #[must_use]
    const fn next_uid(&self) -> u32 {
        self.first_uid + self.nummsg
    }

    /// Borrow the mailbox. Only ever called while the session is
    /// `Ready`; `commit`/`abort` take the handle out on the way to
    /// `Done`, before any further ingestion call could observe its
    /// absence.
    fn mailbox_ref(&self) -> &dyn MailboxStore {
        self.mailbox.as_ref().expect("mailbox accessed after commit/abort").as_ref()
    }

    fn mailbox_mut(&mut self) -> &mut dyn MailboxStore {
        self.mailbox.as_mut().expect("mailbox accessed after commit/abort").as_mut()
    }

    /// Drop the mailbox handle: for `Owned`, this runs the boxed
    /// store's `Drop` and releases whatever lock it holds right here,
    /// rather than waiting for the whole session to be dropped; for
    /// `Borrowed`, it just drops the reference, leaving the caller's
    /// lock untouched.
    fn release_mailbox(&mut self) {
        self.mailbox.take();
    }

    /// Stream `reader`'s bytes straight into the mailbox's final record
    /// path, bypassing staging and the annotator.
    ///
    /// # Errors
    ///
    /// Any failure aborts the session (ingestion is all-or-nothing per
    /// session commit) and is returned to the caller.
    pub async fn from_stream<R>(
        &mut self,
        body: &ParsedBody,
        reader: &mut R,
        internaldate: DateTime<Utc>,
        flags: &[String],
    ) -> Result<u32>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        match self.from_stream_inner(body, reader, internaldate, flags).await {
            Ok(uid) => Ok(uid),
            Err(e) => {
                self.abort().await;
                Err(e)
            }
        }
    }

    async fn from_stream_inner<R>(
        &mut self,
        body: &ParsedBody,
        reader: &mut R,
        internaldate: DateTime<Utc>,
        flags: &[String],
    ) -> Result<u32>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let uid = self.next_uid();
        let mut record = IndexRecord::new(uid, internaldate);
        record.size = body.size;
        record.guid = Some(body.guid);

        let dst_path = self.mailbox_ref().record_filename(&record);
        if let Some(parent) = dst_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&dst_path).await?;
        tokio::io::copy(reader, &mut file).await?;
        file.sync_all().await?;

        if self.mailbox_ref().should_archive(&record) {
            record.system_flags.insert(SystemFlags::ARCHIVED);
        }

        let mut event = (self.event_type != EventType::None).then(|| {
            Event::new(self.event_type, self.mailbox_ref().name().to_string(), record.clone(), self.userid.clone())
        });

        self.apply_flags(&mut record, flags, event.as_mut())?;

        self.mailbox_mut().append_index_record(record.clone()).await?;

        if let Some(mut event) = event {
            event.record = record;
            self.events.push(event);
        }
        self.nummsg += 1;
        Ok(uid)
    }

    /// The primary ingestion path, driving the single-instance stage
    /// copy, the annotator callout, object storage, flag application,
    /// and annotation storage.
    ///
    /// # Errors
    ///
    /// Any failure in the stage/link/flag/index steps aborts the
    /// session and is returned to the caller; callout and annotation
    /// failures are logged and otherwise ignored.
    pub async fn from_stage(
        &mut self,
        body: &ParsedBody,
        stage: &mut Stage,
        internaldate: DateTime<Utc>,
        flags: &[String],
        nolink: bool,
        user_annotations: Annotations,
    ) -> Result<u32> {
        match self.from_stage_inner(body, stage, internaldate, flags, nolink, user_annotations).await {
            Ok(uid) => Ok(uid),
            Err(e) => {
                self.abort().await;
                Err(e)
            }
        }
    }

    async fn from_stage_inner(
        &mut self,
        body: &ParsedBody,
        stage: &mut Stage,
        internaldate: DateTime<Utc>,
        flags: &[String],
        nolink: bool,
        mut user_annotations: Annotations,
    ) -> Result<u32> {
        // Step 2: ensure a copy of the staged content lives on this
        // mailbox's own partition before we try to link/copy from it.
        let fname = stage
            .primary_path()
            .file_name()
            .ok_or_else(|| Error::Parse("stage path has no filename".to_string()))?
            .to_owned();
        let dest_stage_path = self.mailbox_ref().stage_dir().join(&fname);
        stage.link_into_partition(&dest_stage_path).await?;

        // Step 3
        let uid = self.next_uid();
        let mut record = IndexRecord::new(uid, internaldate);

        // Step 4
        let mut event = (self.event_type != EventType::None).then(|| {
            Event::new(self.event_type, self.mailbox_ref().name().to_string(), record.clone(), self.userid.clone())
        });

        // Step 5
        record.size = body.size;
        record.guid = Some(body.guid);

        // Step 6
        if self.mailbox_ref().should_archive(&record) {
            record.system_flags.insert(SystemFlags::ARCHIVED);
        }

        // Step 7
        let record_path = self.mailbox_ref().record_filename(&record);
        self.mailbox_ref().copy_or_link(&dest_stage_path, &record_path, nolink).await?;
        tokio::fs::File::open(&record_path).await?.sync_all().await?;

        // Step 8
        let mut working_flags = flags.to_vec();
        let mut system_annotations = Annotations::new();
        if let Some(callout_path) = self.config.annotator_callout.clone() {
            let request = CalloutRequest {
                fname: record_path.file_name().map_or_else(String::new, |n| n.to_string_lossy().into_owned()),
                user_annotations: user_annotations.clone(),
                flags: working_flags.clone(),
                body_repr: body.body_repr.clone(),
                guid: body.guid,
            };
            let directives = annotator::run_callout(&callout_path, &request).await;
            annotator::apply_directives(&directives, &mut working_flags, &mut user_annotations, &mut system_annotations);
        }

        // Step 9
        let mut externally_stored = false;
        if record.system_flags.contains(SystemFlags::ARCHIVED) && self.config.object_storage_enabled {
            externally_stored = self.put_object(&record, &record_path).await;
            if !externally_stored {
                record.system_flags.remove(SystemFlags::ARCHIVED);
            }
        }

        // Step 10
        self.apply_flags(&mut record, &working_flags, event.as_mut())?;

        // Step 11
        self.mailbox_mut().append_index_record(record.clone()).await?;
        if externally_stored {
            unlink_best_effort(&record_path).await;
        }

        // Step 12. A user-annotation store failure is a real error for
        // the message (propagated, which aborts the session below);
        // only the system-annotation store is logged and swallowed.
        self.store_user_annotations(uid, &user_annotations).await?;
        self.store_system_annotations(uid, &system_annotations).await;

        if let Some(mut event) = event {
            event.record = record;
            self.events.push(event);
        }
        self.nummsg += 1;
        Ok(uid)
    }

    async fn put_object(&mut self, record: &IndexRecord, path: &Path) -> bool {
        let Some(store) = self.object_store.as_deref() else {
            return false;
        };
        let mailbox_name = self.mailbox_ref().name().to_string();
        match store.put(&mailbox_name, record, path).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "object storage put failed, clearing ARCHIVED");
                false
            }
        }
    }

    /// Store user-authored annotations under the session's own auth
    /// context (ACL enforced). Unlike system annotations, a failure
    /// here is a real error for the message.
    ///
    /// # Errors
    ///
    /// Whatever `AnnotationStore::store` returns.
    async fn store_user_annotations(&mut self, uid: u32, annotations: &Annotations) -> Result<()> {
        if annotations.is_empty() {
            return Ok(());
        }
        self.annotation_store.set_auth(false, &self.userid);
        self.annotation_store.store(uid, annotations).await
    }

    /// Store system-authored annotations (those promoted by the
    /// annotator callout) with admin authority, bypassing ACL. Failure
    /// is logged and otherwise ignored, per spec.
    async fn store_system_annotations(&mut self, uid: u32, annotations: &Annotations) {
        if annotations.is_empty() {
            return;
        }
        self.annotation_store.set_auth(true, &self.userid);
        if let Err(e) = self.annotation_store.store(uid, annotations).await {
            warn!(error = %e, uid, "failed to store system annotations, ignoring");
        }
    }

    /// Apply each flag name in `flags` to `record`, gated by the
    /// session's ACL rights; disallowed flags are silently dropped.
    /// Applied names are also recorded on `event`, if present.
    ///
    /// # Errors
    ///
    /// `UserFlagsExhausted` if a user-flag name needs a new slot and the
    /// mailbox's 128-slot table is full.
    fn apply_flags(&mut self, record: &mut IndexRecord, flags: &[String], event: Option<&mut Event>) -> Result<()> {
        let mut applied = Vec::new();
        for raw in flags {
            let name = FlagName::parse(raw);
            let label = name.to_string();
            let allowed = match name {
                FlagName::Seen => {
                    self.seen.set_seen(record);
                    true
                }
                FlagName::Deleted => self.gate_and_set(record, Rights::DELETEMSG, SystemFlags::DELETED),
                FlagName::Draft => self.gate_and_set(record, Rights::WRITE, SystemFlags::DRAFT),
                FlagName::Flagged => self.gate_and_set(record, Rights::WRITE, SystemFlags::FLAGGED),
                FlagName::Answered => self.gate_and_set(record, Rights::WRITE, SystemFlags::ANSWERED),
                FlagName::User(name) => {
                    if self.rights.contains(Rights::WRITE) {
                        let slot = self
                            .mailbox_mut()
                            .user_flag_lookup_or_alloc(&name)
                            .ok_or_else(|| Error::UserFlagsExhausted(self.mailbox_ref().name().to_string()))?;
                        record.user_flags.set(slot);
                        true
                    } else {
                        false
                    }
                }
            };
            if allowed {
                applied.push(label);
            }
        }
        if let Some(event) = event {
            event.applied_flags.extend(applied);
        }
        Ok(())
    }

    fn gate_and_set(&self, record: &mut IndexRecord, required: Rights, bit: SystemFlags) -> bool {
        if self.rights.contains(required) {
            record.system_flags.insert(bit);
            true
        } else {
            false
        }
    }

    /// Bulk-copy `src_uids` from `src_mailbox` into this session's
    /// destination, renumbering and masking per record. An empty
    /// `src_uids` aborts the session immediately with success.
    ///
    /// # Errors
    ///
    /// Any per-record failure aborts the whole session.
    pub async fn copy(
        &mut self,
        src_mailbox: &dyn MailboxStore,
        src_uids: &[u32],
        nolink: bool,
        is_same_user: bool,
    ) -> Result<Vec<u32>> {
        if src_uids.is_empty() {
            self.abort().await;
            return Ok(Vec::new());
        }

        let mut dst_uids = Vec::with_capacity(src_uids.len());
        for &src_uid in src_uids {
            match self.copy_one(src_mailbox, src_uid, nolink, is_same_user).await {
                Ok(dst_uid) => dst_uids.push(dst_uid),
                Err(e) => {
                    self.abort().await;
                    return Err(e);
                }
            }
        }
        Ok(dst_uids)
    }

    async fn copy_one(&mut self, src_mailbox: &dyn MailboxStore, src_uid: u32, nolink: bool, is_same_user: bool) -> Result<u32> {
        let src_record = src_mailbox.cache_record(src_uid).await?;

        let mut dst_record = src_record.clone();
        dst_record.system_flags.remove(SystemFlags::SEEN);
        if !is_same_user {
            dst_record.conversation_id = None;
        }
        dst_record.cache_offset = 0;
        dst_record.user_flags = UserFlagBits::empty();
        dst_record.uid = self.next_uid();

        if self.rights.contains(Rights::WRITE) {
            for slot in src_record.user_flags.iter_set() {
                let Some(name) = src_mailbox.user_flag_name(slot) else { continue };
                if let Some(dst_slot) = self.mailbox_mut().user_flag_lookup_or_alloc(&name) {
                    dst_record.user_flags.set(dst_slot);
                }
            }
        } else {
            dst_record.system_flags &= SystemFlags::DELETED;
        }
        if !self.rights.contains(Rights::DELETEMSG) {
            dst_record.system_flags.remove(SystemFlags::DELETED);
        }

        if src_record.system_flags.contains(SystemFlags::SEEN) {
            self.seen.set_seen(&mut dst_record);
        }

        let src_path = src_mailbox.record_filename(&src_record);
        let dst_path = self.mailbox_ref().record_filename(&dst_record);
        self.mailbox_ref().copy_or_link(&src_path, &dst_path, nolink).await?;

        let mut externally_stored = false;
        if dst_record.system_flags.contains(SystemFlags::ARCHIVED) && self.config.object_storage_enabled {
            externally_stored = self.put_object(&dst_record, &dst_path).await;
            if !externally_stored {
                dst_record.system_flags.remove(SystemFlags::ARCHIVED);
            }
        }

        self.mailbox_mut().append_index_record(dst_record.clone()).await?;
        if externally_stored {
            unlink_best_effort(&dst_path).await;
        }

        if let Err(e) = self
            .annotation_store
            .copy_from(src_mailbox.name(), src_uid, dst_record.uid, &self.userid)
            .await
        {
            warn!(error = %e, src_uid, dst_uid = dst_record.uid, "failed to copy annotations, ignoring");
        }

        if self.event_type != EventType::None {
            let mut event = Event::new(
                EventType::MessageCopy,
                self.mailbox_ref().name().to_string(),
                dst_record.clone(),
                self.userid.clone(),
            );
            event.copied_from = Some(src_record);
            self.events.push(event);
        }

        self.nummsg += 1;
        Ok(dst_record.uid)
    }

    /// A no-op if already `DONE`; otherwise stamps the mailbox, merges
    /// accumulated seen state, durably commits the index, and hands
    /// back the enqueued events for the caller's event-delivery layer
    /// to dispatch.
    ///
    /// # Errors
    ///
    /// An index-commit failure is logged at `error` severity, the
    /// session is transitioned to `DONE`, and the error is returned;
    /// the mailbox must then be treated as possibly inconsistent.
    pub async fn commit(&mut self) -> Result<Vec<Event>> {
        if self.state == LifecycleState::Done {
            return Ok(Vec::new());
        }

        if self.nummsg > 0 {
            self.mailbox_mut().mark_appended(Utc::now());
            self.merge_seen().await?;
        }

        if let Err(e) = self.mailbox_mut().commit().await {
            error!(mailbox = %self.mailbox_ref().name(), error = %e, "IOERROR: committing mailbox index");
            self.state = LifecycleState::Done;
            self.events.drain();
            self.release_mailbox();
            return Err(e);
        }

        self.state = LifecycleState::Done;
        self.release_mailbox();
        Ok(self.events.drain())
    }

    /// Discard pending events and accumulated seen state, transition to
    /// `DONE`. Always succeeds; calling it again on an already-`DONE`
    /// session is a no-op.
    pub async fn abort(&mut self) {
        if self.state == LifecycleState::Done {
            return;
        }
        self.events.drain();
        self.release_mailbox();
        self.state = LifecycleState::Done;
    }

    async fn merge_seen(&mut self) -> Result<()> {
        if self.userid.is_empty() || self.seen.is_empty() {
            return Ok(());
        }
        let Some(seen_store) = self.seen_store.as_deref() else {
            return Ok(());
        };

        let mut db = seen_store.open_or_create(&self.userid).await?;
        let unique_id = self.mailbox_ref().unique_id().to_string();
        let existing = db.read(&unique_id).await?;
        let merged = self.seen.merge(&existing, Utc::now());
        db.write(&unique_id, &merged).await?;
        db.close().await
    }
}

async fn unlink_best_effort(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(file = %path.display(), error = %e, "could not unlink locally archived file");
    }
}
