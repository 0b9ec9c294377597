//! Core types for gridkit

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Name of a field on the remote model.
pub type FieldName = String;

/// Field values of one record, keyed by field name.
pub type RecordValues = BTreeMap<FieldName, Value>;

/// Identifier of a record.
///
/// Persisted records carry the positive id assigned by the remote store.
/// Rows created locally and not yet saved carry a negative (virtual) id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Allocate a fresh virtual id for an unsaved row.
    pub fn new_virtual() -> Self {
        static NEXT_VIRTUAL: AtomicI64 = AtomicI64::new(-1);
        Self(NEXT_VIRTUAL.fetch_sub(1, Ordering::SeqCst))
    }

    /// Whether this id was generated locally for an unsaved row
    #[inline]
    pub fn is_virtual(&self) -> bool {
        self.0 < 0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_virtual() {
            write!(f, "virtual_{}", -self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A field value as exchanged with the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Unset / false-y value
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string (char, text and selection keys)
    String(String),
    /// Calendar date
    Date(NaiveDate),
    /// Date and time without timezone
    DateTime(NaiveDateTime),
    /// Reference to another record: id plus display name
    Reference(i64, String),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value counts as "not set" for required-field validation.
    ///
    /// Booleans are never empty: `false` is a legitimate value.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Reference(id, _) => Some(*id),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Stable textual key used to build group signatures.
    ///
    /// Two values that the remote store would place in the same group must
    /// produce the same key.
    pub fn group_key(&self) -> String {
        match self {
            Value::Null => "false".to_string(),
            Value::Reference(id, _) => format!("ref:{}", id),
            Value::Float(v) => format!("float:{}", v),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::Reference(_, name) => write!(f, "{}", name),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// A record as returned by the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordData {
    pub id: RecordId,
    pub values: RecordValues,
}

impl RecordData {
    pub fn new(id: i64, values: impl IntoIterator<Item = (impl Into<String>, Value)>) -> Self {
        Self {
            id: RecordId(id),
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Get a value by field name
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }
}
