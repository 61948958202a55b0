//! The annotator callout
//!
//! An optional external decision point, consulted once per staged
//! message before flags and annotations are finalized: it may add or
//! remove flags and promote user annotations to system annotations
//! (`append.c` `callout_run`). A callout failure of any kind —
//! unreachable, malformed reply, timeout — is logged and swallowed; it
//! never fails the append itself.

mod reply;
mod transport;

use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::annotation::Annotations;
use crate::record::ContentHash;

pub use reply::{apply_directives, Directive};

const CALLOUT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the callout needs to know about one staged message.
#[derive(Debug, Clone)]
pub struct CalloutRequest {
    pub fname: String,
    pub user_annotations: Annotations,
    pub flags: Vec<String>,
    pub body_repr: String,
    pub guid: ContentHash,
}

impl CalloutRequest {
    /// Render the request the way `callout_encode_args` builds its
    /// `struct buf`: one top-level list with `FILENAME`, `ANNOTATIONS`,
    /// `FLAGS`, `BODY`, and `GUID` fields, in that order.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::from("(FILENAME ");
        push_quoted(&mut out, &self.fname);

        out.push_str(" ANNOTATIONS (");
        let mut first = true;
        for ((entry, attrib), value) in self.user_annotations.iter() {
            if !first {
                out.push(' ');
            }
            first = false;
            push_quoted(&mut out, entry);
            out.push_str(" ((");
            push_quoted(&mut out, attrib);
            out.push(' ');
            push_quoted(&mut out, value);
            out.push_str("))");
        }
        out.push(')');

        out.push_str(" FLAGS (");
        out.push_str(&self.flags.join(" "));
        out.push(')');

        out.push_str(" BODY ");
        push_quoted(&mut out, &self.body_repr);

        out.push_str(" GUID ");
        out.push_str(&self.guid.to_hex());
        out.push(')');
        out
    }
}

fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

/// Run one callout round trip against `callout_path` and return the
/// directives it handed back. Never returns `Err` for a callout-side
/// failure: connect, send, and timeout failures are logged at `warn`
/// and treated as "no directives", matching `append.c`'s "Annotation
/// callout failed, ignoring" behavior. A malformed reply is handled one
/// level down by `reply::parse_reply`, which keeps whatever directives
/// it parsed before the malformed part rather than discarding them.
pub async fn run_callout(callout_path: &Path, request: &CalloutRequest) -> Vec<Directive> {
    match run_callout_inner(callout_path, request).await {
        Ok(directives) => directives,
        Err(e) => {
            warn!(callout = %callout_path.display(), error = %e, "annotation callout failed, ignoring");
            Vec::new()
        }
    }
}

async fn run_callout_inner(callout_path: &Path, request: &CalloutRequest) -> crate::error::Result<Vec<Directive>> {
    let mut conn = transport::connect(callout_path).await?;

    let encoded = request.encode();
    send_chunked(&mut conn, encoded.as_bytes()).await?;

    let raw = tokio::time::timeout(CALLOUT_TIMEOUT, conn.recv_reply())
        .await
        .map_err(|_| crate::error::Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out waiting for callout")))??;

    let text = String::from_utf8_lossy(&raw);
    Ok(reply::parse_reply(&text))
}

/// Send `payload` using the original's counted-length framing: a
/// decimal ASCII length, a newline, the payload, and a zero-length
/// terminator chunk (`append.c` `callout_send_args`).
async fn send_chunked(conn: &mut Box<dyn transport::Transport>, payload: &[u8]) -> crate::error::Result<()> {
    if payload.is_empty() {
        conn.send(b"0\n").await
    } else {
        let mut framed = format!("{}\n", payload.len()).into_bytes();
        framed.extend_from_slice(payload);
        framed.extend_from_slice(b"0\n");
        conn.send(&framed).await
    }
}
