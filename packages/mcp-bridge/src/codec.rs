//! Line framing over a child's standard streams.
//!
//! One JSON object per newline-terminated record, in both directions. The
//! write path serializes behind the per-child stdin mutex so concurrent
//! callers never interleave bytes; the read path classifies each inbound
//! line so the reader task can route replies and drop everything else.

use std::io;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::Mutex;

use crate::protocol::Response;

/// What a single inbound line turned out to be.
#[derive(Debug)]
pub enum Frame {
    /// JSON object with an `id`: a routable JSON-RPC response.
    Response(Response),
    /// Valid JSON without a routable shape; discarded.
    Notification,
    /// Not JSON at all; logged as a child diagnostic.
    Diagnostic,
}

/// Classify one newline-delimited segment of child stdout.
pub fn classify_line(line: &str) -> Frame {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
        return Frame::Diagnostic;
    };
    if value.get("id").is_none() {
        return Frame::Notification;
    }
    match serde_json::from_value::<Response>(value) {
        Ok(response) => Frame::Response(response),
        Err(_) => Frame::Diagnostic,
    }
}

/// Write one framed message to the child's stdin.
///
/// The serialized object and its trailing newline are written and flushed
/// while holding the stdin lock, which is the only write-ordering guarantee
/// callers get.
pub async fn write_message<T: Serialize>(
    stdin: &Mutex<ChildStdin>,
    message: &T,
) -> io::Result<()> {
    let mut payload = serde_json::to_vec(message)?;
    payload.push(b'\n');
    let mut sink = stdin.lock().await;
    sink.write_all(&payload).await?;
    sink.flush().await
}
