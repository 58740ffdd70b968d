//! Envelope - the unit stored in the ring and broadcast to clients
//!
//! An envelope pairs a monotonic id and insertion timestamp with the origin
//! of a record and the record itself. The record is opaque: it is the raw
//! NDJSON line, never interpreted by this system.

use serde::Serialize;
use serde_json::value::RawValue;

use crate::Family;

/// Origin of a record: file basename plus derived family.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    /// Basename of the originating file.
    pub file: String,
    /// Family derived from the basename.
    pub family: Family,
}

impl Source {
    pub fn new(file: impl Into<String>, family: Family) -> Self {
        Self {
            file: file.into(),
            family,
        }
    }
}

/// Opaque record payload: one NDJSON line, carried untouched.
///
/// Lines that are valid JSON serialize verbatim into snapshot documents and
/// SSE frames. Anything else is serialized as a JSON string, so malformed
/// producer output still reaches consumers without breaking the transport.
#[derive(Debug, Clone)]
pub struct Record {
    raw: String,
    is_json: bool,
}

impl Record {
    /// Wrap a raw line. JSON validity is checked once, here.
    pub fn new(line: impl Into<String>) -> Self {
        let raw = line.into();
        let is_json = serde_json::from_str::<&RawValue>(&raw).is_ok();
        Self { raw, is_json }
    }

    /// The raw line as read from the file.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether the raw line parsed as a JSON value.
    pub fn is_json(&self) -> bool {
        self.is_json
    }

    /// The record as a single-line JSON value, for SSE `data:` payloads.
    pub fn to_json_line(&self) -> String {
        if self.is_json {
            self.raw.clone()
        } else {
            serde_json::Value::String(self.raw.clone()).to_string()
        }
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if self.is_json
            && let Ok(raw) = serde_json::from_str::<&RawValue>(&self.raw)
        {
            return raw.serialize(serializer);
        }
        serializer.serialize_str(&self.raw)
    }
}

/// The stored/broadcast unit.
///
/// Ids are assigned by the ring at insertion, start at 1, and are never
/// reused while the process lives. `time` is milliseconds since the epoch.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub id: u64,
    pub time: i64,
    pub source: Source,
    pub record: Record,
}

#[cfg(test)]
#[path = "envelope_test.rs"]
mod tests;
