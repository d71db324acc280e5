//! Error types for msd-solver

use thiserror::Error;

use crate::backend::BackendError;

pub type Result<T> = std::result::Result<T, MsdError>;

#[derive(Error, Debug)]
pub enum MsdError {
    /// Malformed or mismatched input handed to a constructor or setter.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The mass matrix (or another matrix that must be inverted) is singular.
    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    /// A query asked for an output kind that does not exist.
    #[error("Invalid result type: {0}")]
    InvalidResultType(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MsdError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        MsdError::Configuration(msg.into())
    }
}
