//! Store lifecycle errors
//!
//! These are the only failures that do not become error values: if the
//! store cannot start there is nothing for a collection to report against.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineError;

/// Result type for store lifecycle operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Engine failed: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Store task failed: {0}")]
    Task(String),
}
