//! Error types for the hub crate

use thiserror::Error;

/// Errors that can occur in the hub
#[derive(Debug, Error)]
pub enum HubError {
    /// Ring capacity must be non-zero
    #[error("invalid ring capacity: {capacity} (must be > 0)")]
    InvalidCapacity { capacity: usize },
}

/// Result type for hub operations
pub type Result<T> = std::result::Result<T, HubError>;
