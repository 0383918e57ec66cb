//! crates/velgo_core/src/value.rs
//!
//! The schemaless value model shared by every document store adapter.
//! Submissions carry arbitrary client fields, so documents are maps of
//! `FieldValue` rather than fixed structs.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A single stored document: field name to value.
pub type Document = BTreeMap<String, FieldValue>;

/// A value as the document store understands it.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<FieldValue>),
    Map(Document),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts back into plain JSON. Timestamps become RFC 3339 strings.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Boolean(b) => Value::Bool(*b),
            Self::Integer(i) => Value::Number((*i).into()),
            Self::Double(d) => Number::from_f64(*d).map_or(Value::Null, Value::Number),
            Self::String(s) => Value::String(s.clone()),
            Self::Timestamp(ts) => Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
            Self::Array(values) => Value::Array(values.iter().map(Self::to_json).collect()),
            Self::Map(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Human-readable rendering used by the admin panel.
    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::String(s) => s.clone(),
            Self::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M").to_string(),
            other => other.to_json().to_string(),
        }
    }

    /// Orders two values of comparable types; mixed types are unordered.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Double(a), Self::Double(b)) => a.partial_cmp(b),
            (Self::Integer(a), Self::Double(b)) => (*a as f64).partial_cmp(b),
            (Self::Double(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => n.as_f64().map_or(Self::Null, Self::Double),
            },
            Value::String(s) => Self::String(s),
            Value::Array(values) => Self::Array(values.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(document_from_json(map)),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Converts a JSON object (typically a request body) into a document.
pub fn document_from_json(map: Map<String, Value>) -> Document {
    map.into_iter().map(|(k, v)| (k, FieldValue::from(v))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn json_numbers_keep_integer_precision() {
        assert_eq!(FieldValue::from(json!(42)), FieldValue::Integer(42));
        assert_eq!(FieldValue::from(json!(2.5)), FieldValue::Double(2.5));
        assert_eq!(
            FieldValue::from(json!(u64::MAX)),
            FieldValue::Double(u64::MAX as f64)
        );
    }

    #[test]
    fn nested_objects_become_maps() {
        let value = FieldValue::from(json!({"contact": {"phone": "123", "tags": ["a", null]}}));
        let FieldValue::Map(outer) = value else {
            panic!("expected a map");
        };
        let Some(FieldValue::Map(contact)) = outer.get("contact") else {
            panic!("expected nested map");
        };
        assert_eq!(contact.get("phone"), Some(&FieldValue::String("123".into())));
        assert_eq!(
            contact.get("tags"),
            Some(&FieldValue::Array(vec![
                FieldValue::String("a".into()),
                FieldValue::Null
            ]))
        );
    }

    #[test]
    fn timestamps_render_as_rfc3339_in_json() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 8, 30, 0).unwrap();
        assert_eq!(
            FieldValue::Timestamp(ts).to_json(),
            json!("2025-01-01T08:30:00.000000Z")
        );
        assert_eq!(FieldValue::Timestamp(ts).display(), "2025-01-01 08:30");
    }

    #[test]
    fn compare_orders_same_kinds_only() {
        let earlier = FieldValue::Timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let later = FieldValue::Timestamp(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(earlier.compare(&later), Some(Ordering::Less));
        assert_eq!(FieldValue::Integer(2).compare(&FieldValue::Double(1.5)), Some(Ordering::Greater));
        assert_eq!(FieldValue::from("a").compare(&FieldValue::Integer(1)), None);
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(FieldValue::from(None::<String>), FieldValue::Null);
        assert_eq!(FieldValue::from(Some("x")), FieldValue::String("x".into()));
    }
}
