//! Session configuration
//!
//! The original threads the annotator path through a global config
//! lookup (`config_getstring(IMAPOPT_ANNOTATION_CALLOUT)`). This crate
//! threads it explicitly through a `SessionConfig` built once and
//! passed to `AppendSession::setup` instead.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Per-session configuration: where the annotator lives, whether object
/// storage is enabled, and the quota floors a `setup` call should enforce.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Path to the annotator callout target (a Unix socket or an
    /// executable file), or `None` to skip the callout entirely.
    pub annotator_callout: Option<PathBuf>,
    /// Whether archived messages should additionally be pushed to the
    /// object-storage backend.
    pub object_storage_enabled: bool,
    /// Storage-bytes quota floor; `None` means "don't care about quota".
    pub quota_storage_floor: Option<i64>,
    /// Message-count quota floor; `None` means "don't care about quota".
    pub quota_message_floor: Option<i64>,
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_annotator_callout(mut self, path: impl Into<PathBuf>) -> Self {
        self.annotator_callout = Some(path.into());
        self
    }

    #[must_use]
    pub const fn with_object_storage(mut self, enabled: bool) -> Self {
        self.object_storage_enabled = enabled;
        self
    }

    #[must_use]
    pub const fn with_quota_storage_floor(mut self, floor: i64) -> Self {
        self.quota_storage_floor = Some(floor);
        self
    }

    #[must_use]
    pub const fn with_quota_message_floor(mut self, floor: i64) -> Self {
        self.quota_message_floor = Some(floor);
        self
    }

    /// Load configuration from environment variables via `dotenvy`,
    /// reading a `.env` file if present.
    ///
    /// - `ANNOTATOR_CALLOUT` (optional)
    /// - `OBJECT_STORAGE_ENABLED` (optional, default `false`)
    /// - `QUOTA_STORAGE_FLOOR` / `QUOTA_MESSAGE_FLOOR` (optional)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let object_storage_enabled = std::env::var("OBJECT_STORAGE_ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let quota_storage_floor = parse_opt_i64("QUOTA_STORAGE_FLOOR")?;
        let quota_message_floor = parse_opt_i64("QUOTA_MESSAGE_FLOOR")?;

        Ok(Self {
            annotator_callout: std::env::var("ANNOTATOR_CALLOUT").ok().map(PathBuf::from),
            object_storage_enabled,
            quota_storage_floor,
            quota_message_floor,
        })
    }
}

fn parse_opt_i64(var: &str) -> Result<Option<i64>> {
    match std::env::var(var) {
        Ok(v) => v
            .parse()
            .map(Some)
            .map_err(|e: std::num::ParseIntError| Error::Parse(format!("invalid {var}: {e}"))),
        Err(_) => Ok(None),
    }
}
