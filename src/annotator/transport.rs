//! Callout transport: a Unix socket service, or a forked executable
//!
//! The original classifies the callout target with a single `stat()`
//! (`append.c` `callout_run`): a socket means a long-running service to
//! connect to, a regular executable file means something to fork and
//! exec with the request on its stdin and the reply on its stdout. This
//! crate keeps the same dispatch but through `tokio`'s async process and
//! socket types rather than raw `fork`/`exec`.

use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};

use crate::error::{Error, Result};

/// A connected callout transport: write the encoded request, then read
/// the reply until the peer closes its end.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, payload: &[u8]) -> Result<()>;
    async fn recv_reply(&mut self) -> Result<Vec<u8>>;
}

pub struct SocketTransport {
    stream: UnixStream,
}

#[async_trait]
impl Transport for SocketTransport {
    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.stream.write_all(payload).await?;
        Ok(())
    }

    async fn recv_reply(&mut self) -> Result<Vec<u8>> {
        self.stream.shutdown().await.ok();
        let mut buf = Vec::new();
        self.stream.read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

pub struct ExecTransport {
    child: Child,
}

#[async_trait]
impl Transport for ExecTransport {
    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Io(std::io::Error::other("callout child has no stdin")))?;
        stdin.write_all(payload).await?;
        stdin.shutdown().await?;
        Ok(())
    }

    async fn recv_reply(&mut self) -> Result<Vec<u8>> {
        let mut stdout = self
            .child
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("callout child has no stdout")))?;
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await?;
        self.child.wait().await?;
        Ok(buf)
    }
}

/// Classify `callout` by `stat()` and connect: a socket is dialed, an
/// executable regular file is forked with piped stdio (`append.c`
/// `callout_run`'s `S_ISSOCK`/`S_ISREG` dispatch).
///
/// # Errors
///
/// Returns `Error::Io` if `callout` can't be stat'd, is neither a
/// socket nor an executable regular file, or the connect/spawn fails.
pub async fn connect(callout: &Path) -> Result<Box<dyn Transport>> {
    let meta = tokio::fs::metadata(callout).await?;

    if meta.file_type().is_socket() {
        let stream = UnixStream::connect(callout).await?;
        return Ok(Box::new(SocketTransport { stream }));
    }

    if meta.is_file() && meta.permissions().mode() & 0o111 != 0 {
        let child = spawn_callout(callout)?;
        return Ok(Box::new(ExecTransport { child }));
    }

    Err(Error::Io(std::io::Error::other(format!(
        "cannot classify annotation callout {}",
        callout.display()
    ))))
}

fn spawn_callout(callout: &Path) -> Result<Child> {
    Command::new(callout)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(Error::Io)
}
