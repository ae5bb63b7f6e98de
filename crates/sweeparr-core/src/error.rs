//! Error types for adapter-facing operations.

use std::error::Error;

use thiserror::Error;

/// Primary error type for adapter calls made by the cleaning engine.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Adapter call exceeded the configured timeout.
    #[error("adapter call timed out")]
    Timeout {
        /// Instance the call was issued against.
        instance: String,
        /// Operation identifier.
        operation: &'static str,
    },
    /// Adapter reported a backend failure.
    #[error("adapter call failed")]
    Backend {
        /// Instance the call was issued against.
        instance: String,
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Referenced torrent is not known to the client.
    #[error("torrent not found")]
    NotFound {
        /// Canonical hash that could not be resolved.
        hash: String,
    },
}

/// Convenience alias for adapter call results.
pub type AdapterResult<T> = Result<T, AdapterError>;
