//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid path component: {0}")]
    InvalidPathComponent(String),

    #[error("invalid batch header: {0}")]
    InvalidBatch(String),

    #[error("invalid project description: {0}")]
    InvalidProject(String),

    #[error("manifest integrity error: {0}")]
    ManifestIntegrity(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
