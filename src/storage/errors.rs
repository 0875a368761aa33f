//! Record log errors
//!
//! Two families: I/O failures, which leave the log as it was, and
//! corruption, which means the bytes on disk cannot be trusted and the
//! store must not open on them.

use std::io;

use thiserror::Error;

/// Result type for record log operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Failures reading or writing the record log.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The log ends in the middle of a record
    #[error("Torn record at byte {offset}: {reason}")]
    TornRecord { offset: u64, reason: String },

    #[error("Checksum mismatch at byte {offset}: computed {computed:08x}, stored {stored:08x}")]
    ChecksumMismatch {
        offset: u64,
        computed: u32,
        stored: u32,
    },

    /// Checksum holds but the fields inside do not decode
    #[error("Malformed record at byte {offset}: {reason}")]
    Malformed { offset: u64, reason: String },

    /// The index pointed at a record written for another key
    #[error("Record at byte {offset} belongs to {found}, expected {expected}")]
    KeyMismatch {
        offset: u64,
        expected: String,
        found: String,
    },

    /// The record decodes but its body is not a JSON document
    #[error("Undecodable body for {key}: {reason}")]
    BadBody { key: String, reason: String },

    /// A field does not fit the u32 length prefix
    #[error("Record for {key} too large to encode: {len} bytes")]
    RecordTooLarge { key: String, len: usize },
}

impl StorageError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        StorageError::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether the on-disk bytes are untrustworthy (as opposed to an
    /// operation that failed and left the log untouched)
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StorageError::TornRecord { .. }
                | StorageError::ChecksumMismatch { .. }
                | StorageError::Malformed { .. }
                | StorageError::KeyMismatch { .. }
                | StorageError::BadBody { .. }
        )
    }
}
