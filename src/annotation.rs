//! Annotation lists and the annotation-store contract
//!
//! User annotations are kept disjoint from system annotations: system
//! annotations bypass ACL on store, and a failure to write them is
//! logged rather than fatal.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;

/// Key identifying one annotation value: an entry path (e.g.
/// `/comment`) plus an attribute (e.g. `value.shared`).
pub type AnnotationKey = (String, String);

/// An ordered set of (entry, attrib) -> value settings, kept disjoint
/// between user- and system-authored annotations.
#[derive(Debug, Clone, Default)]
pub struct Annotations(BTreeMap<AnnotationKey, String>);

impl Annotations {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn set(&mut self, entry: impl Into<String>, attrib: impl Into<String>, value: impl Into<String>) {
        self.0.insert((entry.into(), attrib.into()), value.into());
    }

    /// Remove a same-entry/same-attrib setting, if present. Used when an
    /// `ANNOTATION` callout directive moves a setting from user- to
    /// system-annotations.
    pub fn remove(&mut self, entry: &str, attrib: &str) -> Option<String> {
        self.0.remove(&(entry.to_string(), attrib.to_string()))
    }

    #[must_use]
    pub fn get(&self, entry: &str, attrib: &str) -> Option<&str> {
        self.0.get(&(entry.to_string(), attrib.to_string())).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AnnotationKey, &String)> {
        self.0.iter()
    }
}

/// A handle bound to one UID, through which user- or system-authored
/// annotations are stored.
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Bind this handle's authority for the next `store` call: either
    /// the session's own auth context (ACL enforced), or admin authority
    /// (ACL bypassed, used for system annotations).
    fn set_auth(&mut self, is_admin: bool, userid: &str);

    /// Store `annotations` against `uid`, under the currently bound
    /// authority. Consolidates the original's separate
    /// `get_annotate_state`/`annotate_state_store` pair into one call.
    async fn store(&mut self, uid: u32, annotations: &Annotations) -> Result<()>;

    /// Copy every annotation from `src_uid` to `dst_uid` within (or
    /// across) mailboxes, as part of the copy path.
    async fn copy_from(&mut self, src_mailbox: &str, src_uid: u32, dst_uid: u32, userid: &str) -> Result<()>;
}
