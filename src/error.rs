//! Coordinator Error Types
//!
//! Typed failures returned to the request dispatcher

use log::{debug, error};
use thiserror::Error;

use crate::store::StoreError;

/// Error kinds surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Conflict,
    StoreUnavailable,
    InvalidInput,
}

/// Session coordinator errors
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: only the session owner can {action}")]
    Unauthorized {
        session_id: String,
        requester_id: String,
        action: &'static str,
    },

    #[error("Conflict while trying to {context}: {source}")]
    Conflict {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("Store unavailable while trying to {context}: {source}")]
    StoreUnavailable {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Wrap a store failure with the operation it interrupted
    ///
    /// Refused conditional writes are expected and logged at debug; every
    /// other store failure is logged at error before it is returned.
    pub fn from_store(context: impl Into<String>, source: StoreError) -> Self {
        let context = context.into();
        if source.is_conflict() {
            debug!("Conditional write refused while trying to {}: {}", context, source);
            Self::Conflict { context, source }
        } else {
            error!("Store failure while trying to {}: {}", context, source);
            Self::StoreUnavailable { context, source }
        }
    }
}

/// Attach operation context to store results
pub trait StoreContext<T> {
    fn context(self, context: impl Into<String>) -> CoordinatorResult<T>;
}

impl<T> StoreContext<T> for Result<T, StoreError> {
    fn context(self, context: impl Into<String>) -> CoordinatorResult<T> {
        self.map_err(|e| CoordinatorError::from_store(context, e))
    }
}

/// Result type alias for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_conflicts_become_conflicts() {
        let err: CoordinatorResult<()> =
            Err(StoreError::conflict("members", "p1")).context("add member p1");
        let err = err.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            err.to_string(),
            "Conflict while trying to add member p1: Item already exists: members/p1"
        );
    }

    #[test]
    fn test_other_store_failures_are_unavailable() {
        let err = CoordinatorError::from_store(
            "delete session s1",
            StoreError::Unavailable("connection reset".into()),
        );
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);

        let err = CoordinatorError::from_store(
            "read session s1",
            StoreError::Serialization("missing field `ownerId`".into()),
        );
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    }

    #[test]
    fn test_context_names_the_interrupted_operation() {
        let err: CoordinatorResult<()> =
            Err(StoreError::Unavailable("connection reset".into())).context("update state of session s1");
        let err = err.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert_eq!(
            err.to_string(),
            "Store unavailable while trying to update state of session s1: Store unavailable: connection reset"
        );
    }

    #[test]
    fn test_unauthorized_message() {
        let err = CoordinatorError::Unauthorized {
            session_id: "s1".into(),
            requester_id: "p2".into(),
            action: "delete this session",
        };
        assert_eq!(
            err.to_string(),
            "Unauthorized: only the session owner can delete this session"
        );
    }
}
