//! Size quotas
//!
//! Checks run before a write reaches the shared engine so one collection
//! cannot flood it with oversized payloads.

use serde_json::Value;

use super::error::ErrorValue;
use crate::config::StoreConfig;

const MIB: u64 = 1024 * 1024;

/// Per-document and per-attachment byte limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaGuard {
    doc_max_bytes: u64,
    attachment_max_bytes: u64,
}

impl QuotaGuard {
    pub fn new(doc_max_bytes: u64, attachment_max_bytes: u64) -> Self {
        Self {
            doc_max_bytes,
            attachment_max_bytes,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.doc_max_bytes, config.attachment_max_bytes)
    }

    pub fn doc_max_bytes(&self) -> u64 {
        self.doc_max_bytes
    }

    pub fn attachment_max_bytes(&self) -> u64 {
        self.attachment_max_bytes
    }

    /// `Some(exception)` when the compact JSON encoding of `doc` is over quota.
    pub fn check_document_size(&self, doc: &Value) -> Option<ErrorValue> {
        let size = serialized_len(doc);
        if size > self.doc_max_bytes {
            return Some(ErrorValue::exception(format!(
                "doc max size {} M",
                in_mebibytes(self.doc_max_bytes)
            )));
        }
        None
    }

    /// `Some(exception)` when the attachment payload is over quota.
    pub fn check_attachment_size(&self, data: &[u8]) -> Option<ErrorValue> {
        if data.len() as u64 > self.attachment_max_bytes {
            return Some(ErrorValue::exception(format!(
                "attachment data up to {} M",
                in_mebibytes(self.attachment_max_bytes)
            )));
        }
        None
    }
}

impl Default for QuotaGuard {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_DOC_MAX_BYTES,
            crate::config::DEFAULT_ATTACHMENT_MAX_BYTES,
        )
    }
}

fn serialized_len(doc: &Value) -> u64 {
    // Value serialization only fails for non-string map keys, which Value
    // cannot hold; treat the impossible case as over any quota
    serde_json::to_vec(doc)
        .map(|bytes| bytes.len() as u64)
        .unwrap_or(u64::MAX)
}

/// Human-readable MiB count: whole numbers print bare, others with decimals.
fn in_mebibytes(bytes: u64) -> String {
    if bytes % MIB == 0 {
        (bytes / MIB).to_string()
    } else {
        format!("{}", bytes as f64 / MIB as f64)
    }
}
