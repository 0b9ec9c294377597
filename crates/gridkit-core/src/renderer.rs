//! Field renderers
//!
//! Column compilation resolves every column to a [`FieldRenderer`] once. The
//! list state machine only ever calls the renderer to format a value, format
//! an aggregate, or check that a raw value is well-formed; it never looks
//! widgets up by name.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::Value;

/// Type of a field as far as formatting and validation are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Char,
    Text,
    Integer,
    Float,
    /// Float holding hours, displayed as `HH:MM`
    FloatTime,
    /// Float amount expressed in the currency held by another field
    Monetary,
    Boolean,
    Selection,
    Many2One,
    Date,
    DateTime,
    /// Manual sequence number exposed as a drag handle
    Handle,
}

impl FieldKind {
    /// Whether values of this kind can be summed/averaged
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Float | Self::FloatTime | Self::Monetary | Self::Handle
        )
    }
}

/// Why a field value is invalid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    /// A required field is empty
    Required,
    /// The raw value cannot be parsed for the field type
    InvalidFormat,
}

impl FieldErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::InvalidFormat => "invalid format",
        }
    }
}

/// Formatter/validator pair for one column
pub trait FieldRenderer: Send + Sync + std::fmt::Debug {
    /// Format a cell value for display
    fn format(&self, value: &Value) -> String;

    /// Format a computed aggregate (sum, avg, ...) for the column footer
    fn format_aggregate(&self, value: f64) -> String;

    /// Check that a value is well-formed for the field type.
    ///
    /// Required-ness is not checked here; it depends on the record.
    fn validate(&self, value: &Value) -> Result<(), FieldErrorKind>;
}

/// Default renderer driven by the field kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindRenderer {
    pub kind: FieldKind,
    /// Decimal digits for float and monetary values
    pub digits: usize,
}

impl KindRenderer {
    pub fn new(kind: FieldKind) -> Self {
        Self { kind, digits: 2 }
    }
}

impl FieldRenderer for KindRenderer {
    fn format(&self, value: &Value) -> String {
        if value.is_null() && self.kind != FieldKind::Boolean {
            return String::new();
        }
        match self.kind {
            FieldKind::Integer | FieldKind::Handle => value
                .as_i64()
                .map(|v| v.to_string())
                .unwrap_or_else(|| value.to_string()),
            FieldKind::Float | FieldKind::Monetary => value
                .as_f64()
                .map(|v| format!("{:.*}", self.digits, v))
                .unwrap_or_else(|| value.to_string()),
            FieldKind::FloatTime => value
                .as_f64()
                .map(format_float_time)
                .unwrap_or_else(|| value.to_string()),
            FieldKind::Boolean => {
                if value.as_bool().unwrap_or(false) {
                    "☑".to_string()
                } else {
                    "☐".to_string()
                }
            }
            _ => value.to_string(),
        }
    }

    fn format_aggregate(&self, value: f64) -> String {
        match self.kind {
            FieldKind::Integer | FieldKind::Handle => {
                if value.fract() == 0.0 {
                    format!("{}", value as i64)
                } else {
                    format!("{:.*}", self.digits, value)
                }
            }
            FieldKind::FloatTime => format_float_time(value),
            _ => format!("{:.*}", self.digits, value),
        }
    }

    fn validate(&self, value: &Value) -> Result<(), FieldErrorKind> {
        if value.is_null() {
            return Ok(());
        }
        let well_formed = match self.kind {
            FieldKind::Integer | FieldKind::Handle => match value {
                Value::Integer(_) => true,
                Value::String(s) => s.trim().is_empty() || s.trim().parse::<i64>().is_ok(),
                _ => false,
            },
            FieldKind::Float | FieldKind::FloatTime | FieldKind::Monetary => match value {
                Value::Integer(_) | Value::Float(_) => true,
                Value::String(s) => s.trim().is_empty() || s.trim().parse::<f64>().is_ok(),
                _ => false,
            },
            FieldKind::Boolean => matches!(value, Value::Bool(_)),
            FieldKind::Date => match value {
                Value::Date(_) => true,
                Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").is_ok(),
                _ => false,
            },
            FieldKind::DateTime => matches!(value, Value::DateTime(_)),
            FieldKind::Many2One => matches!(value, Value::Reference(..) | Value::Integer(_)),
            FieldKind::Char | FieldKind::Text | FieldKind::Selection => {
                matches!(value, Value::String(_))
            }
        };
        if well_formed {
            Ok(())
        } else {
            Err(FieldErrorKind::InvalidFormat)
        }
    }
}

/// Format hours as `HH:MM` (e.g. `1.5` → `01:30`, `-0.25` → `-00:15`)
pub fn format_float_time(hours: f64) -> String {
    let sign = if hours < 0.0 { "-" } else { "" };
    let total_minutes = (hours.abs() * 60.0).round() as i64;
    format!("{}{:02}:{:02}", sign, total_minutes / 60, total_minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_time_formatting() {
        assert_eq!(format_float_time(1.5), "01:30");
        assert_eq!(format_float_time(0.0), "00:00");
        assert_eq!(format_float_time(-0.25), "-00:15");
        assert_eq!(format_float_time(26.999), "27:00");
    }

    #[test]
    fn test_aggregate_uses_widget_format() {
        let time = KindRenderer::new(FieldKind::FloatTime);
        assert_eq!(time.format_aggregate(2.5 + 1.25), "03:45");

        let integer = KindRenderer::new(FieldKind::Integer);
        assert_eq!(integer.format_aggregate(32.0), "32");
        assert_eq!(integer.format_aggregate(7.5), "7.50");

        let money = KindRenderer::new(FieldKind::Monetary);
        assert_eq!(money.format_aggregate(1200.0), "1200.00");
    }

    #[test]
    fn test_validation() {
        let integer = KindRenderer::new(FieldKind::Integer);
        assert_eq!(integer.validate(&Value::Integer(3)), Ok(()));
        assert_eq!(integer.validate(&Value::from("12")), Ok(()));
        assert_eq!(
            integer.validate(&Value::from("twelve")),
            Err(FieldErrorKind::InvalidFormat)
        );
        assert_eq!(integer.validate(&Value::Null), Ok(()));

        let date = KindRenderer::new(FieldKind::Date);
        assert_eq!(date.validate(&Value::from("2024-02-30")), Err(FieldErrorKind::InvalidFormat));
        assert_eq!(date.validate(&Value::from("2024-02-29")), Ok(()));
    }

    #[test]
    fn test_format_cells() {
        let float = KindRenderer::new(FieldKind::Float);
        assert_eq!(float.format(&Value::Float(0.4)), "0.40");
        assert_eq!(float.format(&Value::Null), "");
        let boolean = KindRenderer::new(FieldKind::Boolean);
        assert_eq!(boolean.format(&Value::Null), "☐");
    }
}
