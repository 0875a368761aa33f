//! Error values returned by collection operations
//!
//! Collection operations never propagate engine errors as-is. Every failure
//! is reshaped into an [`ErrorValue`], which serializes as:
//!
//! ```text
//! { "error": true, "name": "...", "message": "...", ...extra }
//! ```
//!
//! Validation failures raised by the collection layer itself are named
//! `exception`. Engine failures keep the engine's own name and message.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::engine::EngineError;

/// Name given to failures detected before the engine is contacted
pub const EXCEPTION: &str = "exception";

/// Message of the failure reported for any operation on a closed store
pub const CLOSED_MESSAGE: &str = "database is closed";

/// Field names the wire shape reserves; `extra` never overrides them
const RESERVED_FIELDS: [&str; 3] = ["error", "name", "message"];

/// Result type of every collection operation
pub type OperationResult<T> = Result<T, ErrorValue>;

/// A failure, as a plain value.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    name: String,
    message: String,
    extra: Map<String, Value>,
}

impl ErrorValue {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            extra: Map::new(),
        }
    }

    /// Local validation failure
    pub fn exception(message: impl Into<String>) -> Self {
        Self::new(EXCEPTION, message)
    }

    /// Engine failure, name and message passed through.
    ///
    /// A closed engine reads the same as a closed store, whether the store
    /// was closed before the call or while it was in flight.
    pub fn from_engine(err: &EngineError) -> Self {
        match err {
            EngineError::Closed => Self::exception(CLOSED_MESSAGE),
            _ => Self::new(err.name(), err.to_string()),
        }
    }

    /// Attach the logical id the failure concerns
    pub fn with_id(self, id: impl Into<String>) -> Self {
        self.with_extra("id", Value::String(id.into()))
    }

    /// Attach a contextual field. Reserved field names are ignored.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if !RESERVED_FIELDS.contains(&key.as_str()) {
            self.extra.insert(key, value);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// The `id` field, when one was attached
    pub fn id(&self) -> Option<&str> {
        self.extra.get("id").and_then(Value::as_str)
    }

    pub fn is_exception(&self) -> bool {
        self.name == EXCEPTION
    }

    /// JSON wire shape
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(3 + self.extra.len());
        map.insert("error".into(), Value::Bool(true));
        map.insert("name".into(), Value::String(self.name.clone()));
        map.insert("message".into(), Value::String(self.message.clone()));
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

impl From<EngineError> for ErrorValue {
    fn from(err: EngineError) -> Self {
        Self::from_engine(&err)
    }
}

impl Serialize for ErrorValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3 + self.extra.len()))?;
        map.serialize_entry("error", &true)?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("message", &self.message)?;
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for ErrorValue {}
