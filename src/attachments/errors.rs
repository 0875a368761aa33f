//! # Attachment Backend Errors

use thiserror::Error;

/// Result type for attachment backend operations
pub type AttachmentResult<T> = Result<T, AttachmentError>;

/// Attachment blob errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl AttachmentError {
    /// Whether the blob simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, AttachmentError::ObjectNotFound(_))
    }
}
