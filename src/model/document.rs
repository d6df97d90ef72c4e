//! Schema-less key/value documents with typed accessors.
//!
//! Event payloads and strategy configs are open JSON objects whose shape varies
//! by event type or strategy type. Accessors report absence or a type mismatch
//! through `FieldError` instead of failing the whole document.

use crate::error::FieldError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// An open, string-keyed map of untyped JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Parse a JSON object from text. Returns `None` for malformed JSON or
    /// for any JSON value that is not an object.
    pub fn from_json_str(text: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Some(Self(map)),
            _ => None,
        }
    }

    /// Builder-style insert, mostly used when constructing fixtures and metadata.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Raw value lookup. JSON `null` is reported as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Required string field.
    pub fn str_field(&self, key: &str) -> Result<&str, FieldError> {
        match self.get(key) {
            None => Err(FieldError::Missing(key.to_string())),
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(_) => Err(FieldError::WrongType {
                key: key.to_string(),
                expected: "string",
            }),
        }
    }

    /// Optional string field: absent is `Ok(None)`, wrong type is still an error.
    pub fn optional_str(&self, key: &str) -> Result<Option<&str>, FieldError> {
        match self.str_field(key) {
            Ok(s) => Ok(Some(s)),
            Err(FieldError::Missing(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Required numeric field. Accepts JSON numbers and numeric strings.
    pub fn decimal_field(&self, key: &str) -> Result<Decimal, FieldError> {
        let wrong_type = || FieldError::WrongType {
            key: key.to_string(),
            expected: "number",
        };

        match self.get(key) {
            None => Err(FieldError::Missing(key.to_string())),
            Some(Value::Number(n)) => parse_decimal(&n.to_string()).ok_or_else(wrong_type),
            Some(Value::String(s)) => parse_decimal(s.trim()).ok_or_else(wrong_type),
            Some(_) => Err(wrong_type()),
        }
    }

    /// Optional numeric field.
    pub fn optional_decimal(&self, key: &str) -> Result<Option<Decimal>, FieldError> {
        match self.decimal_field(key) {
            Ok(d) => Ok(Some(d)),
            Err(FieldError::Missing(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => Document::from(map),
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_from_json_str_rejects_non_objects() {
        assert!(Document::from_json_str(r#"{"a": 1}"#).is_some());
        assert!(Document::from_json_str("[1, 2]").is_none());
        assert!(Document::from_json_str("not json").is_none());
        assert!(Document::from_json_str("").is_none());
    }

    #[test]
    fn test_str_field_signals() {
        let d = doc(json!({"side": "yes", "price": 0.5, "gone": null}));

        assert_eq!(d.str_field("side"), Ok("yes"));
        assert_eq!(
            d.str_field("price"),
            Err(FieldError::WrongType {
                key: "price".to_string(),
                expected: "string"
            })
        );
        assert_eq!(d.str_field("gone"), Err(FieldError::Missing("gone".to_string())));
        assert_eq!(d.optional_str("absent"), Ok(None));
    }

    #[test]
    fn test_decimal_field_keeps_shortest_representation() {
        let d = doc(json!({"price": 0.6, "shares": 10, "text": "0.35", "sci": 1e-7}));

        assert_eq!(d.decimal_field("price"), Ok(dec!(0.6)));
        assert_eq!(d.decimal_field("shares"), Ok(dec!(10)));
        assert_eq!(d.decimal_field("text"), Ok(dec!(0.35)));
        assert_eq!(d.decimal_field("sci"), Ok(dec!(0.0000001)));
    }

    #[test]
    fn test_decimal_field_mismatch() {
        let d = doc(json!({"price": "cheap", "flag": true}));

        assert!(matches!(d.decimal_field("price"), Err(FieldError::WrongType { .. })));
        assert!(matches!(d.decimal_field("flag"), Err(FieldError::WrongType { .. })));
        assert_eq!(d.optional_decimal("missing"), Ok(None));
        assert!(d.optional_decimal("flag").is_err());
    }
}
