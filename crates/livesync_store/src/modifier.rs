//! Document modifiers.

use crate::error::{StoreError, StoreResult};
use livesync_protocol::Document;
use serde_json::Value;
use std::collections::BTreeMap;

/// A write-path document modifier.
///
/// Supports `$set`/`$unset` operator documents and whole-document
/// replacement. `_id` can never be modified; it is silently skipped in
/// operator documents and preserved across replacement.
#[derive(Debug, Clone, PartialEq)]
pub enum Modifier {
    /// Replace all non-id fields with the given map.
    Replace(BTreeMap<String, Value>),
    /// Apply `$set` assignments and `$unset` removals.
    Operators {
        /// Fields to assign.
        set: BTreeMap<String, Value>,
        /// Fields to remove.
        unset: Vec<String>,
    },
}

impl Modifier {
    /// Creates a modifier setting a single field.
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Operators {
            set: BTreeMap::from([(field.into(), value.into())]),
            unset: Vec::new(),
        }
    }

    /// Creates a modifier removing a single field.
    pub fn unset(field: impl Into<String>) -> Self {
        Self::Operators {
            set: BTreeMap::new(),
            unset: vec![field.into()],
        }
    }

    /// Parses a modifier from a JSON value.
    ///
    /// An object with any `$`-prefixed key is an operator document; only
    /// `$set` and `$unset` are supported. Any other object is a
    /// whole-document replacement.
    pub fn from_value(value: &Value) -> StoreResult<Self> {
        let map = value.as_object().ok_or_else(|| {
            StoreError::InvalidModifier(format!("expected an object, got {value}"))
        })?;

        if !map.keys().any(|key| key.starts_with('$')) {
            let fields = map
                .iter()
                .filter(|(key, _)| key.as_str() != "_id")
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            return Ok(Self::Replace(fields));
        }

        let mut set = BTreeMap::new();
        let mut unset = Vec::new();
        for (operator, spec) in map {
            let spec = spec.as_object().ok_or_else(|| {
                StoreError::InvalidModifier(format!("{operator} expects an object"))
            })?;
            match operator.as_str() {
                "$set" => {
                    for (field, value) in spec {
                        if field != "_id" {
                            set.insert(field.clone(), value.clone());
                        }
                    }
                }
                "$unset" => {
                    for field in spec.keys() {
                        if field != "_id" {
                            unset.push(field.clone());
                        }
                    }
                }
                other => {
                    return Err(StoreError::InvalidModifier(format!(
                        "unsupported operator {other}"
                    )))
                }
            }
        }
        Ok(Self::Operators { set, unset })
    }

    /// Applies the modifier to a document in place.
    pub fn apply(&self, doc: &mut Document) {
        match self {
            Self::Replace(fields) => doc.replace_fields(fields.clone()),
            Self::Operators { set, unset } => {
                for (field, value) in set {
                    doc.set(field.clone(), value.clone());
                }
                for field in unset {
                    doc.unset(field);
                }
            }
        }
    }
}
