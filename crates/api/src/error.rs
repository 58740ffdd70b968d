//! Error types for the HTTP front

use std::io;

use thiserror::Error;

/// Errors that can occur running the HTTP server
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failed to bind the listen socket
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The server loop failed
    #[error("http server error: {0}")]
    Serve(#[source] io::Error),
}
