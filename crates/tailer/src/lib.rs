//! zrx Tailer - multi-file NDJSON tail engine
//!
//! Follows the append-only NDJSON files a monitoring server writes into its
//! real-time-export directory and emits one event per complete line, plus
//! lifecycle notices for opens, rotations, truncations, and recoverable I/O
//! errors.
//!
//! - [`FileTailer`] follows one file through appends, truncation (size
//!   shrinks below the read offset), and rotation (inode replacement under
//!   the same path), with bounded chunked reads and exponential idle
//!   backoff.
//! - [`DirectoryTailer`] scans the directory against include/ignore
//!   patterns, keeps exactly one child tailer per matching file, classifies
//!   records into a [`Family`](zrx_protocol::Family), and forwards child
//!   events upward.
//!
//! Filesystem change notifications are used only to cut latency: they poke
//! file tailers out of backoff and debounce a rescan. Correctness rests on
//! polling alone, so a lost or unavailable watcher degrades latency, never
//! delivery.

mod dir;
mod error;
mod event;
mod file;
mod lines;

pub use dir::{DirectoryTailer, DirectoryTailerConfig, default_ignore, default_include};
pub use error::{Result, TailError};
pub use event::{FileEvent, TailEvent};
pub use file::{FileTailer, FileTailerConfig, FileTailerHandle};
