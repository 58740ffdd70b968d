//! Tailer event model
//!
//! A typed rendering of the tail engine's notifications. [`FileEvent`] is
//! what a single file tailer emits; the directory tailer forwards these
//! upward as [`TailEvent`]s, annotating data records with the family derived
//! from the file basename.

use std::path::PathBuf;

use zrx_protocol::Family;

/// Event emitted by a single [`FileTailer`](crate::FileTailer)
#[derive(Debug, Clone)]
pub enum FileEvent {
    /// The file was opened
    Ready {
        path: PathBuf,
        size: u64,
        inode: Option<u64>,
    },
    /// One complete line, newline stripped
    Data { path: PathBuf, line: String },
    /// Rotation or truncation notice
    Info { path: PathBuf, msg: String },
    /// Recoverable I/O problem
    Warn { path: PathBuf, msg: String },
    /// Reserved for record-structural validation
    ParseError { path: PathBuf, msg: String },
}

/// Event emitted by the [`DirectoryTailer`](crate::DirectoryTailer)
#[derive(Debug, Clone)]
pub enum TailEvent {
    /// A tracked file was opened
    Ready {
        path: PathBuf,
        size: u64,
        inode: Option<u64>,
    },
    /// One complete line with its derived family
    Data {
        path: PathBuf,
        family: Family,
        line: String,
    },
    /// Rotation or truncation notice
    Info { path: PathBuf, msg: String },
    /// Recoverable I/O problem
    Warn { path: PathBuf, msg: String },
    /// Reserved for record-structural validation
    ParseError { path: PathBuf, msg: String },
}

impl TailEvent {
    /// Lift a child event, tagging data with the child's family.
    pub fn from_file_event(event: FileEvent, family: Family) -> TailEvent {
        match event {
            FileEvent::Ready { path, size, inode } => TailEvent::Ready { path, size, inode },
            FileEvent::Data { path, line } => TailEvent::Data { path, family, line },
            FileEvent::Info { path, msg } => TailEvent::Info { path, msg },
            FileEvent::Warn { path, msg } => TailEvent::Warn { path, msg },
            FileEvent::ParseError { path, msg } => TailEvent::ParseError { path, msg },
        }
    }
}
