//! Engine error types
//!
//! Each variant carries a stable `name()` that the collection layer passes
//! through unchanged when it reshapes failures into error values.

use thiserror::Error;

use crate::attachments::AttachmentError;
use crate::storage::StorageError;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Failures surfaced by a [`DocumentEngine`](super::DocumentEngine).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The key was never written (`missing`) or is tombstoned (`deleted`)
    #[error("{reason}")]
    NotFound { reason: String },

    /// The supplied revision is not the current one
    #[error("Document update conflict")]
    Conflict,

    /// The request itself is malformed for the engine
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Attachment(#[from] AttachmentError),

    /// The engine handle has been closed
    #[error("database is closed")]
    Closed,

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Not-found error for a key that has no record at all
    pub fn missing() -> Self {
        EngineError::NotFound {
            reason: "missing".to_string(),
        }
    }

    /// Not-found error for a key whose latest record is a tombstone
    pub fn deleted() -> Self {
        EngineError::NotFound {
            reason: "deleted".to_string(),
        }
    }

    /// Engine classification of this failure
    pub fn name(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::Conflict => "conflict",
            EngineError::BadRequest(_) => "bad_request",
            EngineError::Storage(_) => "storage_error",
            EngineError::Attachment(_) => "attachment_error",
            EngineError::Closed => "closed",
            EngineError::Internal(_) => "internal",
        }
    }

    /// Whether this is a not-found failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }
}
