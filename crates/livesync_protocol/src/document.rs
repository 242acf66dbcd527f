//! Document model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A keyed field structure with a unique `_id`.
///
/// The id is held apart from the other fields so that field-level diffing
/// never has to special-case it. On the wire the document stays flat:
/// `{"_id": "...", "title": "..."}`.
///
/// The id is optional only until the store assigns one; every document
/// read back from a collection carries an id.
///
/// Documents are copied by value into remote state and diffs, never
/// aliased, so later mutation cannot corrupt historical diff state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

impl Document {
    /// Creates a document with the given id and no fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Creates a document without an id (the store assigns one on insert).
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Adds a field, builder style.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns the document id, if assigned.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Assigns the document id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Removes the document id.
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    /// Returns the non-id fields.
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Returns a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Sets a field value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Removes a field. Returns true if it was present.
    pub fn unset(&mut self, name: &str) -> bool {
        self.fields.remove(name).is_some()
    }

    /// Replaces all non-id fields, leaving the id untouched.
    pub fn replace_fields(&mut self, fields: BTreeMap<String, Value>) {
        self.fields = fields;
    }

    /// Decodes a document from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Encodes the document as a flat JSON object.
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        if let Some(id) = &self.id {
            map.insert("_id".to_owned(), Value::String(id.clone()));
        }
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.clone());
        }
        Value::Object(map)
    }
}
