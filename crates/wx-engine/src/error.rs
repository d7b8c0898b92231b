//! Error types for the weather engine.

use thiserror::Error;

/// Result type alias using [`EngineError`].
pub type EngineResult<T> = Result<T, EngineError>;

/// Primary error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Decode(#[from] grib2_decoder::Grib2Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not a file or directory: {0}")]
    InvalidPath(std::path::PathBuf),
}
