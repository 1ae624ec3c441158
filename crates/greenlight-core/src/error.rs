use thiserror::Error;

/// Top-level error type for the Greenlight engine.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates define
/// their own error types and implement `From<SubsystemError> for
/// GreenlightError` so that the `?` operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GreenlightError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for GreenlightError {
    fn from(err: toml::de::Error) -> Self {
        GreenlightError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for GreenlightError {
    fn from(err: toml::ser::Error) -> Self {
        GreenlightError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for GreenlightError {
    fn from(err: serde_json::Error) -> Self {
        GreenlightError::Serialization(err.to_string())
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GreenlightError>;
