//! Engine error type and the boundary error report

use crate::id::{EntityId, EntityKind};
use serde::{Deserialize, Serialize};

/// Engine result type
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    /// A cascade step failed after at least one earlier step committed.
    /// Every step is idempotent, so retrying the whole operation is safe.
    #[error("{operation} stopped at step '{step}' after {committed} committed step(s): {source}")]
    PartialFailure {
        operation: &'static str,
        step: &'static str,
        committed: usize,
        #[source]
        source: Box<EngineError>,
    },
    #[error("Internal engine error: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl EngineError {
    pub fn not_found(kind: EntityKind, id: &EntityId) -> Self {
        EngineError::NotFound { kind, id: id.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            EngineError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Unauthorized(_) => ErrorKind::Unauthorized,
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::PartialFailure { .. } => ErrorKind::PartialFailure,
            EngineError::Internal(_) | EngineError::Io(_) | EngineError::SerdeJson(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Error categories surfaced at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidIdentifier,
    ValidationFailed,
    NotFound,
    Unauthorized,
    Forbidden,
    Conflict,
    PartialFailure,
    Internal,
}

/// What a caller outside the engine gets to see of a failure: a kind and a
/// message. Store and I/O details stay in the logs.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&EngineError> for ErrorReport {
    fn from(err: &EngineError) -> Self {
        let kind = err.kind();
        let message = match err {
            EngineError::Internal(_) | EngineError::Io(_) | EngineError::SerdeJson(_) => {
                "Internal error".to_string()
            }
            EngineError::PartialFailure { operation, step, .. } => {
                format!("{} did not complete (stopped at '{}'); retry the operation", operation, step)
            }
            other => other.to_string(),
        };
        Self { kind, message }
    }
}

impl From<EngineError> for ErrorReport {
    fn from(err: EngineError) -> Self {
        ErrorReport::from(&err)
    }
}
