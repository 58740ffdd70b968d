//! Error types for the tailer crate

use thiserror::Error;

/// Errors that can occur configuring the tail engine
#[derive(Debug, Error)]
pub enum TailError {
    /// An include or ignore pattern did not compile
    #[error("invalid file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Result type for tailer operations
pub type Result<T> = std::result::Result<T, TailError>;
