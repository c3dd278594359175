use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Store-assigned record identifier
pub type Id = i64;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Value kind accepted by a scalar field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    /// ISO 8601 calendar date (`YYYY-MM-DD`)
    Date,
    /// Text restricted to a fixed set of values
    Choice(&'static [&'static str]),
}

impl FieldKind {
    /// Whether a non-null JSON value has the shape this kind requires
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;

        match (self, value) {
            (FieldKind::Text, Value::String(_)) => true,
            (FieldKind::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldKind::Boolean, Value::Bool(_)) => true,
            (FieldKind::Date, Value::String(s)) => NaiveDate::parse_from_str(s, DATE_FORMAT).is_ok(),
            (FieldKind::Choice(values), Value::String(s)) => values.contains(&s.as_str()),
            _ => false,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FieldKind::Text => "string".to_string(),
            FieldKind::Integer => "integer".to_string(),
            FieldKind::Boolean => "boolean".to_string(),
            FieldKind::Date => "date (YYYY-MM-DD)".to_string(),
            FieldKind::Choice(values) => format!("one of [{}]", values.join(", ")),
        }
    }
}

/// Depth and source accepted on expanded reads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpandQuery {
    pub depth: Option<u32>,
    /// Entity type issuing the request; empty means top-level
    pub source: Option<String>,
}
