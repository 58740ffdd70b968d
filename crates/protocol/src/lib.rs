//! zrx Protocol - shared data model for the export stream
//!
//! This crate defines the types every other crate speaks:
//!
//! - [`Family`] - classification tag derived from the source file basename
//! - [`Envelope`] - the unit stored in the replay ring and broadcast to
//!   clients (monotonic id + timestamp + source + opaque record)
//! - [`Record`] - the raw NDJSON line, carried untouched
//! - [`frame`] - the SSE wire format written to connected clients

mod envelope;
mod family;
pub mod frame;

pub use envelope::{Envelope, Record, Source};
pub use family::{Family, UnknownFamily};
