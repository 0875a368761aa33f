//! Key namespacing
//!
//! Every collection shares one engine key space. A logical id `i` in
//! collection `ns` is stored under the physical key `ns/i`, and a
//! collection scan covers the inclusive range `[ns/, ns/\u{10FFFF}]`.
//! Keys compare as UTF-8 bytes, which orders them by code point, so no key
//! from an adjacent namespace can fall inside that range.

use std::fmt;

use super::error::ErrorValue;

/// Separator between namespace and logical id
pub const DELIMITER: char = '/';

/// Upper sentinel appended to a prefix to bound a range scan
pub const HIGH_SENTINEL: char = '\u{10FFFF}';

/// A validated collection name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Validate a collection name: non-empty and free of the delimiter.
    pub fn new(name: impl Into<String>) -> Result<Self, ErrorValue> {
        let name = name.into();
        if name.is_empty() {
            return Err(ErrorValue::exception("namespace empty"));
        }
        if name.contains(DELIMITER) {
            return Err(ErrorValue::exception(format!(
                "namespace must not contain '{}'",
                DELIMITER
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Physical key for a logical id
    pub fn encode(&self, id: &str) -> String {
        encode(&self.0, id)
    }

    /// Logical id for a physical key
    pub fn decode<'a>(&self, key: &'a str) -> &'a str {
        decode(&self.0, key)
    }

    /// Inclusive scan bounds for this namespace
    pub fn range_bounds(&self, start_id: Option<&str>) -> (String, String) {
        range_bounds(&self.0, start_id)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `namespace + "/" + id`
pub fn encode(namespace: &str, id: &str) -> String {
    let mut key = String::with_capacity(namespace.len() + 1 + id.len());
    key.push_str(namespace);
    key.push(DELIMITER);
    key.push_str(id);
    key
}

/// Strip the `namespace + "/"` prefix; keys without it come back unchanged.
pub fn decode<'a>(namespace: &str, key: &'a str) -> &'a str {
    key.strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix(DELIMITER))
        .unwrap_or(key)
}

/// `(low, high)` covering every key that starts with `encode(namespace, start_id)`.
pub fn range_bounds(namespace: &str, start_id: Option<&str>) -> (String, String) {
    let low = encode(namespace, start_id.unwrap_or(""));
    let mut high = String::with_capacity(low.len() + HIGH_SENTINEL.len_utf8());
    high.push_str(&low);
    high.push(HIGH_SENTINEL);
    (low, high)
}
