//! Delta structures bringing a client's view up to date.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Documents keyed by id.
pub type DocumentMap = BTreeMap<String, Document>;

/// Document maps keyed by collection name.
pub type CollectionDocs = BTreeMap<String, DocumentMap>;

/// Field diffs keyed by document id, keyed by collection name.
pub type CollectionDiffs = BTreeMap<String, BTreeMap<String, FieldDiff>>;

/// Field-level difference between two versions of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    /// Fields present in the old version but absent in the new one.
    pub cleared: Vec<String>,
    /// Fields whose value differs, or that are newly present.
    pub fields: BTreeMap<String, Value>,
}

impl FieldDiff {
    /// Returns true if nothing was cleared or changed.
    pub fn is_empty(&self) -> bool {
        self.cleared.is_empty() && self.fields.is_empty()
    }
}

/// The minimal added/changed/removed set produced by one update cycle.
///
/// A collection key may be present with an empty inner map; such an entry
/// produces no frames when the delta is flushed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaSet {
    /// Documents the client does not have yet.
    pub added: CollectionDocs,
    /// Field diffs for documents the client already has.
    pub changed: CollectionDiffs,
    /// Documents no subscription needs anymore.
    pub removed: CollectionDocs,
}

impl DeltaSet {
    /// Returns true if the delta carries no documents or diffs at all.
    pub fn is_empty(&self) -> bool {
        self.added.values().all(BTreeMap::is_empty)
            && self.changed.values().all(BTreeMap::is_empty)
            && self.removed.values().all(BTreeMap::is_empty)
    }
}
