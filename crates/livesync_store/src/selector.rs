//! Equality selectors.

use crate::error::{StoreError, StoreResult};
use livesync_protocol::Document;
use serde_json::Value;
use std::collections::BTreeMap;

/// An equality-on-fields document matcher.
///
/// An empty selector matches every document. `_id` is matched against the
/// document id rather than a field. Richer query shapes are out of scope
/// for the store; this is the surface the write path needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    fields: BTreeMap<String, Value>,
}

impl Selector {
    /// Creates a selector matching every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a selector matching a single document id.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::all().and("_id", Value::String(id.into()))
    }

    /// Creates a selector matching one field by equality.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    /// Adds another equality condition.
    #[must_use]
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Parses a selector from a JSON value.
    ///
    /// Null (or a missing parameter) selects everything; anything other
    /// than an object is rejected.
    pub fn from_value(value: &Value) -> StoreResult<Self> {
        match value {
            Value::Null => Ok(Self::all()),
            Value::Object(map) => Ok(Self {
                fields: map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            }),
            other => Err(StoreError::InvalidSelector(format!(
                "expected an object, got {other}"
            ))),
        }
    }

    /// Returns true if the document satisfies every condition.
    pub fn matches(&self, doc: &Document) -> bool {
        self.fields.iter().all(|(field, expected)| {
            if field == "_id" {
                match expected {
                    Value::String(id) => doc.id() == Some(id.as_str()),
                    _ => false,
                }
            } else {
                doc.get(field) == Some(expected)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_selector_matches_everything() {
        let doc = Document::new("id_1").with_field("a", 1);
        assert!(Selector::all().matches(&doc));
    }

    #[test]
    fn field_equality() {
        let doc = Document::new("id_1").with_field("a", 1);
        assert!(Selector::eq("a", 1).matches(&doc));
        assert!(!Selector::eq("a", 2).matches(&doc));
        assert!(!Selector::eq("b", 1).matches(&doc));
    }

    #[test]
    fn id_matches_against_document_id() {
        let doc = Document::new("id_1").with_field("a", 1);
        assert!(Selector::by_id("id_1").matches(&doc));
        assert!(!Selector::by_id("id_2").matches(&doc));
    }

    #[test]
    fn compound_conditions() {
        let doc = Document::new("id_1").with_field("a", 1).with_field("b", 2);
        assert!(Selector::eq("a", 1).and("b", 2).matches(&doc));
        assert!(!Selector::eq("a", 1).and("b", 3).matches(&doc));
    }

    #[test]
    fn parse_from_value() {
        assert_eq!(Selector::from_value(&Value::Null).unwrap(), Selector::all());

        let parsed = Selector::from_value(&json!({"a": 1})).unwrap();
        assert!(parsed.matches(&Document::new("x").with_field("a", 1)));

        assert!(Selector::from_value(&json!([1, 2])).is_err());
    }
}
