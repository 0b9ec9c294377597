//! Search domains and sort orders
//!
//! A [`Domain`] is a conjunction of field conditions. It is what the list
//! view sends to the remote store to describe "the records matching the
//! current query", and what it narrows when it opens a group.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{FieldName, RecordValues, Value};

/// Comparison operator of a single condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    #[default]
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    /// Case-insensitive substring match
    Contains,
    IsSet,
    IsNotSet,
}

impl ConditionOp {
    /// Get the display label for the operator
    pub fn label(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::Contains => "ilike",
            Self::IsSet => "is set",
            Self::IsNotSet => "is not set",
        }
    }
}

/// A single `field op value` leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: FieldName,
    #[serde(default)]
    pub op: ConditionOp,
    #[serde(default = "null_value")]
    pub value: Value,
}

fn null_value() -> Value {
    Value::Null
}

impl Condition {
    pub fn new(field: impl Into<String>, op: ConditionOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOp::Equal, value)
    }

    /// Evaluate the condition against a set of record values.
    ///
    /// A missing field is treated as `Null`.
    pub fn matches(&self, values: &RecordValues) -> bool {
        let actual = values.get(&self.field).unwrap_or(&Value::Null);
        match self.op {
            ConditionOp::Equal => values_equal(actual, &self.value),
            ConditionOp::NotEqual => !values_equal(actual, &self.value),
            ConditionOp::LessThan => compare_values(actual, &self.value) == Ordering::Less,
            ConditionOp::LessThanOrEqual => compare_values(actual, &self.value) != Ordering::Greater,
            ConditionOp::GreaterThan => compare_values(actual, &self.value) == Ordering::Greater,
            ConditionOp::GreaterThanOrEqual => compare_values(actual, &self.value) != Ordering::Less,
            ConditionOp::Contains => actual
                .to_string()
                .to_lowercase()
                .contains(&self.value.to_string().to_lowercase()),
            ConditionOp::IsSet => !actual.is_empty() && actual != &Value::Bool(false),
            ConditionOp::IsNotSet => actual.is_empty() || actual == &Value::Bool(false),
        }
    }
}

/// A conjunction of conditions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(pub Vec<Condition>);

impl Domain {
    /// The domain matching every record
    pub fn all() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.0
    }

    /// Return a new domain restricted by one more condition
    pub fn and(&self, condition: Condition) -> Self {
        let mut conditions = self.0.clone();
        conditions.push(condition);
        Self(conditions)
    }

    pub fn matches(&self, values: &RecordValues) -> bool {
        self.0.iter().all(|c| c.matches(values))
    }
}

impl From<Vec<Condition>> for Domain {
    fn from(conditions: Vec<Condition>) -> Self {
        Self(conditions)
    }
}

/// Sort direction of one order clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl SortDirection {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    pub fn flipped(&self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

/// One `(field, direction)` order clause
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderSpec {
    pub field: FieldName,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Render an order list the way the store expects it: `"a ASC, b DESC"`
pub fn order_to_string(orders: &[OrderSpec]) -> String {
    orders
        .iter()
        .map(|o| format!("{} {}", o.field, o.direction.label()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Equality with numeric promotion (`Integer(2) == Float(2.0)`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Bool(false)) | (Value::Bool(false), Value::Null) => true,
        (Value::Reference(a, _), Value::Reference(b, _)) => a == b,
        (Value::Reference(a, _), Value::Integer(b)) | (Value::Integer(b), Value::Reference(a, _)) => {
            a == b
        }
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            compare_values(a, b) == Ordering::Equal
        }
        _ => a == b,
    }
}

/// Total order over values, nulls first
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare_non_null_values(a, b),
    }
}

/// Compare two non-null values
pub fn compare_non_null_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Date(a), Value::Date(b)) => a.cmp(b),
        (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
        // References sort by display name, like the store does
        (Value::Reference(_, a), Value::Reference(_, b)) => a.cmp(b),

        // Cross-type numeric comparison (promote to f64)
        (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),

        // Fallback: compare string representations
        _ => a.to_string().cmp(&b.to_string()),
    }
}
