//! # Sample Errors
//!
//! Storage failures of the in-memory database. DAOs return
//! [`PortalError`], so every [`SampleError`] converts into one: a missing row
//! becomes [`PortalError::NotFound`], everything else a storage error.

use data_portal::PortalError;

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("Row {key} not found in table '{table}'")]
    RowNotFound { table: String, key: i64 },

    #[error("Argument has no integer '{0}'")]
    MissingKey(String),

    #[error("Expected an object argument, got {0}")]
    NotAnObject(String),

    #[error("Connection was not opened by the memory connection manager")]
    NotASession,

    #[error(transparent)]
    Portal(#[from] PortalError),
}

impl From<SampleError> for PortalError {
    fn from(error: SampleError) -> Self {
        match error {
            SampleError::Portal(inner) => inner,
            SampleError::RowNotFound { .. } => PortalError::NotFound(error.to_string()),
            other => PortalError::Storage(other.to_string()),
        }
    }
}
