//! zrx Hub - bounded replay ring and SSE fan-out
//!
//! This crate is the server-side distribution point for exported records:
//!
//! - [`RingBuffer`] stores the most recent envelopes with monotonic ids and
//!   answers filtered range queries for snapshot requests and catch-up.
//! - [`SseHub`] keeps the set of connected live clients and broadcasts
//!   framed events with per-client drop-on-overflow and periodic heartbeats.
//!
//! # Architecture
//!
//! ```text
//! DirectoryTailer data events
//!         │
//!         ▼
//!   RingBuffer.push()  ── assigns id, stamps time
//!         │
//!         ▼
//!   SseHub.broadcast() ── one frame per connected sink
//!         │                (dropped per-sink past the pending-byte bound)
//!         ▼
//!   HTTP live streams        snapshot requests ──► RingBuffer.query()
//! ```

mod error;
mod hub;
mod ring;
mod sink;

pub use error::{HubError, Result};
pub use hub::{HubStats, SseHub};
pub use ring::{DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT, Query, RingBuffer};
pub use sink::SseReceiver;
