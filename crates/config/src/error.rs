//! Configuration error types

use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when reading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that does not parse
    #[error("invalid value for {var}: '{value}' ({message})")]
    InvalidValue {
        /// Environment variable name
        var: &'static str,
        /// The offending value
        value: String,
        /// What was expected
        message: String,
    },

    /// A value parsed but violates a constraint
    #[error("{var} out of range: {message}")]
    OutOfRange {
        /// Environment variable name
        var: &'static str,
        /// Constraint description
        message: String,
    },
}

impl ConfigError {
    /// Create an InvalidValue error
    pub fn invalid_value(
        var: &'static str,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            var,
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create an OutOfRange error
    pub fn out_of_range(var: &'static str, message: impl Into<String>) -> Self {
        Self::OutOfRange {
            var,
            message: message.into(),
        }
    }
}
