//! Structured metadata attached to log records
//!
//! - `LogContext`: per-record key-value fields
//! - `LoggerContext`: default fields merged into every record

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Value type for structured logging fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(fl) => write!(f, "{}", fl),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

impl FieldValue {
    /// Convert to serde_json::Value for JSON serialization
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
            FieldValue::Int(i) => serde_json::Value::Number((*i).into()),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Null => serde_json::Value::Null,
        }
    }

    /// Borrow the value as a string slice if it is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int(i64::from(i))
    }
}

impl From<u16> for FieldValue {
    fn from(i: u16) -> Self {
        FieldValue::Int(i64::from(i))
    }
}

impl From<u64> for FieldValue {
    fn from(i: u64) -> Self {
        i64::try_from(i)
            .map(FieldValue::Int)
            .unwrap_or(FieldValue::Float(i as f64))
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Metadata fields for a single log record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogContext {
    fields: BTreeMap<String, FieldValue>,
}

impl LogContext {
    /// Create a new empty log context
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Add a field to the context
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Add a field to the context (mutable version)
    pub fn add_field<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Get all fields
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Format fields as key=value pairs
    pub fn format_fields(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_fields())
    }
}

/// Default metadata shared by every record a logger emits
///
/// Thread-safe: clones share the same underlying fields.
///
/// # Example
///
/// ```
/// use log_express::core::LoggerContext;
///
/// let ctx = LoggerContext::new();
/// ctx.set("service", "users-api");
/// assert_eq!(ctx.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoggerContext {
    fields: Arc<RwLock<BTreeMap<String, FieldValue>>>,
}

impl LoggerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, overwriting any previous value
    pub fn set<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.fields.write().remove(key);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.read().len()
    }

    /// Merge default fields into a record's context
    ///
    /// Record-level fields take priority over defaults.
    pub fn merge_into(&self, log_context: &mut LogContext) {
        let fields = self.fields.read();
        for (key, value) in fields.iter() {
            log_context
                .fields
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_with_fields() {
        let ctx = LogContext::new()
            .with_field("status_code", 200u16)
            .with_field("method", "GET")
            .with_field("cached", false);

        assert_eq!(ctx.fields().len(), 3);
        assert_eq!(ctx.get("method").and_then(FieldValue::as_str), Some("GET"));
    }

    #[test]
    fn test_log_context_format_is_key_ordered() {
        let ctx = LogContext::new()
            .with_field("url", "/api/users")
            .with_field("method", "GET");

        assert_eq!(ctx.format_fields(), "method=GET url=/api/users");
    }

    #[test]
    fn test_option_field_value() {
        let none: Option<&str> = None;
        assert_eq!(FieldValue::from(none), FieldValue::Null);
        assert_eq!(FieldValue::from(Some("x")), FieldValue::String("x".into()));
    }

    #[test]
    fn test_logger_context_merge_priority() {
        let defaults = LoggerContext::new();
        defaults.set("service", "users-api");
        defaults.set("env", "dev");

        let mut ctx = LogContext::new().with_field("env", "test");
        defaults.merge_into(&mut ctx);

        assert_eq!(ctx.fields().len(), 2);
        assert_eq!(ctx.get("env").and_then(FieldValue::as_str), Some("test"));
        assert_eq!(
            ctx.get("service").and_then(FieldValue::as_str),
            Some("users-api")
        );
    }

    #[test]
    fn test_logger_context_remove() {
        let defaults = LoggerContext::new();
        defaults.set("a", 1);
        defaults.set("b", 2);
        defaults.remove("a");
        assert_eq!(defaults.len(), 1);
    }
}
