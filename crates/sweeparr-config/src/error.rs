//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Settings file could not be read.
    #[error("failed to read settings file '{path}'")]
    Io {
        /// Path that failed to load.
        path: PathBuf,
        /// Source IO error.
        #[source]
        source: io::Error,
    },
    /// Settings file was not valid YAML for the settings schema.
    #[error("failed to parse settings file")]
    Parse {
        /// Source deserialisation error.
        #[source]
        source: serde_yaml::Error,
    },
    /// Field contained an invalid value.
    #[error("invalid value for '{field}' in '{section}': {reason}")]
    InvalidField {
        /// Section that failed validation.
        section: String,
        /// Field that failed validation.
        field: String,
        /// Human-readable reason for the failure.
        reason: String,
    },
    /// Block pattern was not a valid regular expression.
    #[error("invalid block pattern '{pattern}'")]
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
        /// Source regex error.
        #[source]
        source: regex::Error,
    },
    /// An instance name was reused or referenced an unknown peer.
    #[error("invalid instance wiring: {reason}")]
    InvalidInstance {
        /// Human-readable reason for the failure.
        reason: String,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
