//! Store Error Types
//!
//! Failures raised by entity store engines

use thiserror::Error;

/// Entity store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// A conditional write found the key already present
    #[error("Item already exists: {collection}/{key}")]
    Conflict { collection: String, key: String },

    /// Transport or engine failure
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn conflict(collection: impl Into<String>, key: impl Into<String>) -> Self {
        StoreError::Conflict {
            collection: collection.into(),
            key: key.into(),
        }
    }

    /// Whether this is a failed put condition
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Unavailable(format!("store worker failed: {}", err))
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
