//! SSE wire framing
//!
//! One broadcast writes one frame to every connected sink:
//!
//! ```text
//! id: <id>\n            (only when an id is attached)
//! event: <name>\n       (only when non-empty)
//! data: <payload>\n\n
//! ```
//!
//! Payloads must be single-line; records are NDJSON lines so this holds by
//! construction. Comment frames (`: <text>\n\n`) carry heartbeats and the
//! connection greeting and are ignored by compliant clients.

use bytes::Bytes;

/// Encode one event frame.
pub fn event_frame(event: &str, data: &str, id: Option<u64>) -> Bytes {
    let mut out = String::with_capacity(data.len() + event.len() + 32);
    if let Some(id) = id {
        out.push_str("id: ");
        out.push_str(&id.to_string());
        out.push('\n');
    }
    if !event.is_empty() {
        out.push_str("event: ");
        out.push_str(event);
        out.push('\n');
    }
    out.push_str("data: ");
    out.push_str(data);
    out.push_str("\n\n");
    Bytes::from(out)
}

/// Encode a comment frame.
pub fn comment_frame(text: &str) -> Bytes {
    Bytes::from(format!(": {text}\n\n"))
}

/// The greeting written when a live-stream connection is accepted.
pub fn connected_frame() -> Bytes {
    comment_frame("connected")
}

/// The periodic keep-alive frame, carrying the current epoch milliseconds.
pub fn heartbeat_frame(millis: i64) -> Bytes {
    comment_frame(&format!("hb {millis}"))
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
