//! Per-connection remote state.

use livesync_protocol::Document;
use std::collections::BTreeMap;

/// One reference-counted document entry in remote state.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedDocument {
    /// How many subscriptions on the connection currently hold the doc.
    pub count: u32,
    /// Set for an entry seeded by an accepted optimistic insert that no
    /// subscription has taken over yet. The first add for the id absorbs
    /// the reference instead of incrementing the count.
    pub seeded: bool,
    /// The document as last sent to the client.
    pub doc: Document,
}

/// The reference-counted ledger of documents already sent to one client.
///
/// Invariant: an entry exists iff its count is greater than zero. A
/// document shared by several subscriptions is sent once and removed only
/// when the last subscription releases it.
///
/// Remote state is exclusive to one connection and owned by that
/// connection's subscription manager; it is dropped with the connection.
#[derive(Debug, Default)]
pub struct RemoteState {
    collections: BTreeMap<String, BTreeMap<String, TrackedDocument>>,
}

impl RemoteState {
    /// Creates empty remote state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tracked entry for a document, if any.
    pub fn tracked(&self, collection: &str, id: &str) -> Option<&TrackedDocument> {
        self.collections.get(collection)?.get(id)
    }

    /// Returns true if the client is known to have the document.
    pub fn contains(&self, collection: &str, id: &str) -> bool {
        self.tracked(collection, id).is_some()
    }

    /// Returns the number of tracked documents across all collections.
    pub fn document_count(&self) -> usize {
        self.collections.values().map(BTreeMap::len).sum()
    }

    /// Seeds an entry for a document the originating client already has.
    ///
    /// Used when an optimistic insert's predicted id was accepted: the
    /// client inserted the document locally, so the next subscription
    /// flush must not echo it back as an add. Returns true if a new entry
    /// was seeded; an id the client already holds is left untouched.
    pub fn accept_remote_insert(&mut self, collection: &str, doc: Document) -> bool {
        let Some(id) = doc.id().map(str::to_owned) else {
            return false;
        };
        let tracked = self.entry(collection);
        if tracked.contains_key(&id) {
            return false;
        }
        tracked.insert(
            id,
            TrackedDocument {
                count: 1,
                seeded: true,
                doc,
            },
        );
        true
    }

    /// Retracts an entry seeded by [`accept_remote_insert`] whose write
    /// never landed. Entries a subscription has already taken over are
    /// left untouched.
    ///
    /// [`accept_remote_insert`]: RemoteState::accept_remote_insert
    pub fn retract_remote_insert(&mut self, collection: &str, id: &str) {
        if let Some(tracked) = self.get_mut(collection) {
            if tracked.get(id).is_some_and(|entry| entry.seeded) {
                tracked.remove(id);
            }
        }
    }

    /// Returns the mutable per-collection map, creating it if needed.
    pub(crate) fn entry(&mut self, collection: &str) -> &mut BTreeMap<String, TrackedDocument> {
        self.collections.entry(collection.to_owned()).or_default()
    }

    /// Returns the mutable per-collection map only if it exists.
    pub(crate) fn get_mut(
        &mut self,
        collection: &str,
    ) -> Option<&mut BTreeMap<String, TrackedDocument>> {
        self.collections.get_mut(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_remote_insert_seeds_single_reference() {
        let mut remote = RemoteState::new();
        assert!(remote.accept_remote_insert("tasks", Document::new("id_1").with_field("a", 1)));

        let tracked = remote.tracked("tasks", "id_1").unwrap();
        assert_eq!(tracked.count, 1);
        assert!(tracked.seeded);
        assert_eq!(tracked.doc.get("a"), Some(&serde_json::json!(1)));
        assert_eq!(remote.document_count(), 1);
    }

    #[test]
    fn accept_remote_insert_ignores_anonymous_documents() {
        let mut remote = RemoteState::new();
        assert!(!remote.accept_remote_insert("tasks", Document::anonymous()));
        assert_eq!(remote.document_count(), 0);
    }

    #[test]
    fn accept_remote_insert_keeps_existing_entry() {
        let mut remote = RemoteState::new();
        remote.entry("tasks").insert(
            "id_1".to_owned(),
            TrackedDocument {
                count: 3,
                seeded: false,
                doc: Document::new("id_1"),
            },
        );
        assert!(!remote.accept_remote_insert("tasks", Document::new("id_1").with_field("a", 1)));
        assert_eq!(remote.tracked("tasks", "id_1").unwrap().count, 3);
        assert!(!remote.tracked("tasks", "id_1").unwrap().seeded);
    }

    #[test]
    fn retract_removes_only_still_seeded_entries() {
        let mut remote = RemoteState::new();
        remote.accept_remote_insert("tasks", Document::new("id_1"));
        remote.retract_remote_insert("tasks", "id_1");
        assert!(!remote.contains("tasks", "id_1"));

        // An entry a subscription holds is not retractable.
        remote.entry("tasks").insert(
            "id_2".to_owned(),
            TrackedDocument {
                count: 1,
                seeded: false,
                doc: Document::new("id_2"),
            },
        );
        remote.retract_remote_insert("tasks", "id_2");
        assert!(remote.contains("tasks", "id_2"));

        // Unknown ids and collections are no-ops.
        remote.retract_remote_insert("tasks", "id_9");
        remote.retract_remote_insert("notes", "id_1");
    }
}
