//! Error types for application startup and runtime.

use thiserror::Error;

/// Primary error type for application wiring.
#[derive(Debug, Error)]
pub enum AppError {
    /// Settings could not be loaded or validated.
    #[error("configuration error")]
    Config(#[from] sweeparr_config::ConfigError),
    /// The cleaning engine rejected its configuration.
    #[error("cleaning engine error")]
    Cleaner(#[from] sweeparr_cleaner::CleanerError),
    /// Telemetry initialisation failed.
    #[error("telemetry initialisation failed")]
    Telemetry(#[source] anyhow::Error),
    /// The durable store could not be reached or migrated.
    #[error("database initialisation failed")]
    Database(#[source] anyhow::Error),
    /// A configured instance references a backend this build cannot drive.
    #[error("unsupported backend kind '{kind}' for instance '{instance}'")]
    UnsupportedBackend {
        /// Backend kind from the settings file.
        kind: String,
        /// Instance display name.
        instance: String,
    },
}

/// Convenience alias for application results.
pub type AppResult<T> = Result<T, AppError>;
