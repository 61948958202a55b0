//! Single-instance staging
//!
//! One on-disk copy per delivered message, hard-linked into potentially
//! many mailbox partitions.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::record::ContentHash;

/// The single-instance buffer for one incoming message.
///
/// `parts[0]` is the first-created spool file; every other entry is an
/// equal-content hard-linked (or copied) copy of it on another storage
/// partition. "Is our partition present?" is resolved by string equality
/// on the canonical final path, matching the original's `strcmp` contract
/// rather than by, say, comparing partition identifiers.
#[derive(Debug, Clone)]
pub struct Stage {
    fname: String,
    parts: Vec<PathBuf>,
    guid: Option<ContentHash>,
}

impl Stage {
    /// The first-created spool file, which the caller streams the
    /// message body into before any `from_stage` call.
    #[must_use]
    pub fn primary_path(&self) -> &Path {
        &self.parts[0]
    }

    /// All paths currently backing this stage, across partitions.
    #[must_use]
    pub fn parts(&self) -> &[PathBuf] {
        &self.parts
    }

    #[must_use]
    pub const fn guid(&self) -> Option<ContentHash> {
        self.guid
    }

    pub fn set_guid(&mut self, guid: ContentHash) {
        self.guid = Some(guid);
    }

    /// `true` once a path equal to `path` is already registered for this
    /// stage (our single-instance-store invariant: one content per
    /// partition).
    fn has_part(&self, path: &Path) -> bool {
        self.parts.iter().any(|p| p == path)
    }

    /// Ensure a copy of this stage's content exists at `dest`, on the
    /// destination mailbox's partition. If `dest` is not yet one of our
    /// parts, create it by copying `parts[0]` there and register it.
    ///
    /// On a first attempt that fails because the stage directory for
    /// `dest` doesn't exist yet, the directory is created (mode 0755) and
    /// the copy retried once. Unlike the original (`append.c:877-903`),
    /// any partially-written file left by the failed attempt is unlinked
    /// before the retry ( flags the original's lack of this as
    /// a latent bug; this rewrite closes it).
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if both the initial copy and the
    /// directory-creation retry fail.
    pub async fn link_into_partition(&mut self, dest: &Path) -> Result<()> {
        if self.has_part(dest) {
            return Ok(());
        }

        if copy_file(self.primary_path(), dest).await.is_err() {
            let _ = tokio::fs::remove_file(dest).await;

            if let Some(parent) = dest.parent() {
                match tokio::fs::create_dir_all(parent).await {
                    Ok(()) => {
                        info!(dir = %parent.display(), "created stage directory");
                    }
                    Err(e) => {
                        error!(dir = %parent.display(), error = %e, "couldn't create stage directory");
                    }
                }
            }
            copy_file(self.primary_path(), dest).await.map_err(|e| {
                error!(file = %dest.display(), error = %e, "IOERROR: creating message file");
                e
            })?;
        }

        self.parts.push(dest.to_path_buf());
        Ok(())
    }
}

/// Build a staging filename from (pid, internaldate, serial) and create
/// the file for read+write, returning both the open writer (which doubles
/// as the spool file the caller streams the message bytes into) and the
/// new `Stage`.
///
/// If creation fails because the stage directory does not exist, the
/// directory is created with mode 0755 and creation is retried once.
///
/// # Errors
///
/// Returns an `Io` error if the file cannot be created even after the
/// directory-creation retry.
pub async fn new_stage(
    stage_dir: &Path,
    internaldate: chrono::DateTime<chrono::Utc>,
    serial: u32,
) -> Result<(File, Stage)> {
    let fname = format!(
        "{}-{}-{}",
        std::process::id(),
        internaldate.timestamp(),
        serial
    );
    let stagefile = stage_dir.join(&fname);

    let _ = tokio::fs::remove_file(&stagefile).await;

    let file = match File::create(&stagefile).await {
        Ok(f) => f,
        Err(_) => {
            tokio::fs::create_dir_all(stage_dir).await?;
            info!(dir = %stage_dir.display(), "created stage directory");
            File::create(&stagefile).await.map_err(|e| {
                error!(file = %stagefile.display(), error = %e, "IOERROR: creating message file");
                e
            })?
        }
    };

    let stage = Stage {
        fname,
        parts: vec![stagefile],
        guid: None,
    };

    Ok((file, stage))
}

/// Unlink every path registered on `stage`, logging (without failing) on
/// individual unlink errors. Idempotent: calling this twice, or on a
/// stage that has already lost some of its files, is harmless.
pub async fn remove_stage(stage: &mut Stage) {
    for path in stage.parts.drain(..) {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(file = %path.display(), error = %e, "IOERROR: error unlinking staged file");
            }
        }
    }
}

async fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    tokio::fs::copy(src, dest).await?;
    Ok(())
}
