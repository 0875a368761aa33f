//! Engine value types
//!
//! Wire shape of a document:
//!
//! ```text
//! { "id": "...", "rev": "1-...", "_attachments": { ... }, ...fields }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::EngineError;

/// A stored document.
///
/// `id` is whatever key the holder works with: the physical key inside the
/// engine, the logical id once a collection hands it back to a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(
        rename = "_attachments",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub attachments: BTreeMap<String, AttachmentStub>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Create a document with no revision and no fields
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            attachments: BTreeMap::new(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Builder-style revision setter
    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = Some(rev.into());
        self
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Parse a document from its JSON wire shape
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Render the JSON wire shape
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Metadata the document carries for each attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentStub {
    pub content_type: String,
    pub length: u64,
    /// `sha256-<base64>` of the blob bytes
    pub digest: String,
}

/// Successful write acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteStamp {
    pub ok: bool,
    pub id: String,
    pub rev: String,
}

impl WriteStamp {
    pub fn new(id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            ok: true,
            id: id.into(),
            rev: rev.into(),
        }
    }
}

/// One row of a range scan or key fetch.
///
/// A row without `doc` and without `error` is a deleted key.
#[derive(Debug)]
pub struct ScanRow {
    pub key: String,
    pub doc: Option<Document>,
    pub error: Option<EngineError>,
}

impl ScanRow {
    pub fn found(key: impl Into<String>, doc: Document) -> Self {
        Self {
            key: key.into(),
            doc: Some(doc),
            error: None,
        }
    }

    pub fn deleted(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            doc: None,
            error: None,
        }
    }

    pub fn failed(key: impl Into<String>, error: EngineError) -> Self {
        Self {
            key: key.into(),
            doc: None,
            error: Some(error),
        }
    }
}
