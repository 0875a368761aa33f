//! Store configuration
//!
//! Loaded from a JSON file:
//!
//! ```json
//! { "data_dir": "/var/lib/app/db", "db_name": "tenantdb", "auto_compaction": true }
//! ```
//!
//! Everything except `data_dir` is optional.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default per-document quota (2 MiB of compact JSON)
pub const DEFAULT_DOC_MAX_BYTES: u64 = 2 * 1024 * 1024;

/// Default per-attachment quota (20 MiB)
pub const DEFAULT_ATTACHMENT_MAX_BYTES: u64 = 20 * 1024 * 1024;

/// Default database directory name under `data_dir`
pub const DEFAULT_DB_NAME: &str = "tenantdb";

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Data directory (required)
    pub data_dir: PathBuf,

    /// Database directory name under `data_dir` (default "tenantdb")
    #[serde(default = "default_db_name")]
    pub db_name: String,

    /// Max compact-JSON size of one document (default 2 MiB)
    #[serde(default = "default_doc_max_bytes")]
    pub doc_max_bytes: u64,

    /// Max byte length of one attachment (default 20 MiB)
    #[serde(default = "default_attachment_max_bytes")]
    pub attachment_max_bytes: u64,

    /// Compact the record log automatically (default true)
    #[serde(default = "default_auto_compaction")]
    pub auto_compaction: bool,
}

fn default_db_name() -> String {
    DEFAULT_DB_NAME.to_string()
}
fn default_doc_max_bytes() -> u64 {
    DEFAULT_DOC_MAX_BYTES
}
fn default_attachment_max_bytes() -> u64 {
    DEFAULT_ATTACHMENT_MAX_BYTES
}
fn default_auto_compaction() -> bool {
    true
}

impl StoreConfig {
    /// Configuration with defaults for everything but the data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            db_name: default_db_name(),
            doc_max_bytes: default_doc_max_bytes(),
            attachment_max_bytes: default_attachment_max_bytes(),
            auto_compaction: default_auto_compaction(),
        }
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: StoreConfig = serde_json::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }

    pub fn with_db_name(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = db_name.into();
        self
    }

    pub fn with_doc_max_bytes(mut self, bytes: u64) -> Self {
        self.doc_max_bytes = bytes;
        self
    }

    pub fn with_attachment_max_bytes(mut self, bytes: u64) -> Self {
        self.attachment_max_bytes = bytes;
        self
    }

    pub fn with_auto_compaction(mut self, enabled: bool) -> Self {
        self.auto_compaction = enabled;
        self
    }

    /// Reject settings the store cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }

        // db_name is a single directory component
        let mut components = Path::new(&self.db_name).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(std::path::Component::Normal(_)), None)
        );
        if !single_normal {
            return Err(ConfigError::Invalid(format!(
                "db_name must be a plain directory name, got '{}'",
                self.db_name
            )));
        }

        if self.doc_max_bytes == 0 {
            return Err(ConfigError::Invalid("doc_max_bytes must be > 0".into()));
        }
        if self.attachment_max_bytes == 0 {
            return Err(ConfigError::Invalid(
                "attachment_max_bytes must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Directory the engine is opened in: `<data_dir>/<db_name>`
    pub fn engine_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_name)
    }
}
