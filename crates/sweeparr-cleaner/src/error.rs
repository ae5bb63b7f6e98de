//! Error types for the cleaning engine.

use thiserror::Error;

/// Primary error type for cleaning operations.
///
/// The orchestrators use the variant to decide blast radius: a [`Store`]
/// failure aborts the whole pass, anything else is contained at the item or
/// instance level.
///
/// [`Store`]: CleanerError::Store
#[derive(Debug, Error)]
pub enum CleanerError {
    /// The durable strike/job-run store failed; fatal to the current pass.
    #[error("persistence failure during {operation}")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: anyhow::Error,
    },
    /// A configured block pattern could not be compiled.
    #[error("invalid block pattern '{pattern}'")]
    Pattern {
        /// Offending pattern.
        pattern: String,
        /// Source regex error.
        #[source]
        source: regex::Error,
    },
}

impl CleanerError {
    pub(crate) fn store(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Store { operation, source }
    }
}

/// Convenience alias for cleaning results.
pub type CleanerResult<T> = Result<T, CleanerError>;
