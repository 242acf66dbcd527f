//! Named document collections.

use crate::cursor::Cursor;
use crate::error::{StoreError, StoreResult};
use crate::ident::{random_id, DOCUMENT_ID_LENGTH};
use crate::modifier::Modifier;
use crate::selector::Selector;
use livesync_protocol::Document;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Callback invoked when a collection's contents change.
///
/// Listeners are invoked synchronously on the mutating thread, after the
/// write lock has been released and only for writes that succeeded.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// A named, observable document collection.
pub struct Collection {
    name: String,
    docs: RwLock<BTreeMap<String, Document>>,
    listeners: RwLock<Vec<(u64, ChangeListener)>>,
    next_listener_id: AtomicU64,
}

impl Collection {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: RwLock::new(BTreeMap::new()),
            listeners: RwLock::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts a document, generating an id when none is set.
    ///
    /// Returns the definitive document id.
    pub fn insert(&self, mut doc: Document) -> StoreResult<String> {
        let id = match doc.id() {
            Some(id) => id.to_owned(),
            None => {
                let id = random_id(DOCUMENT_ID_LENGTH);
                doc.set_id(id.clone());
                id
            }
        };
        {
            let mut docs = self.docs.write();
            if docs.contains_key(&id) {
                return Err(StoreError::DuplicateId {
                    collection: self.name.clone(),
                    id,
                });
            }
            docs.insert(id.clone(), doc);
        }
        self.notify();
        Ok(id)
    }

    /// Inserts several documents, returning their ids.
    pub fn insert_all(&self, docs: Vec<Document>) -> StoreResult<Vec<String>> {
        docs.into_iter().map(|doc| self.insert(doc)).collect()
    }

    /// Applies the modifier to matching documents.
    ///
    /// Touches every match when `multi` is set, at most one otherwise.
    /// Returns the number of documents updated.
    pub fn update(&self, selector: &Selector, modifier: &Modifier, multi: bool) -> usize {
        let mut updated = 0;
        {
            let mut docs = self.docs.write();
            for doc in docs.values_mut() {
                if selector.matches(doc) {
                    modifier.apply(doc);
                    updated += 1;
                    if !multi {
                        break;
                    }
                }
            }
        }
        if updated > 0 {
            self.notify();
        }
        updated
    }

    /// Removes matching documents.
    ///
    /// Removes every match when `multi` is set, at most one otherwise.
    /// Returns the removed documents.
    pub fn remove(&self, selector: &Selector, multi: bool) -> Vec<Document> {
        let removed: Vec<Document> = {
            let mut docs = self.docs.write();
            let mut ids: Vec<String> = docs
                .values()
                .filter(|doc| selector.matches(doc))
                .filter_map(|doc| doc.id().map(str::to_owned))
                .collect();
            if !multi {
                ids.truncate(1);
            }
            ids.iter().filter_map(|id| docs.remove(id)).collect()
        };
        if !removed.is_empty() {
            self.notify();
        }
        removed
    }

    /// Creates a live query over this collection.
    pub fn find(self: &Arc<Self>, selector: Selector) -> Cursor {
        Cursor::new(Arc::clone(self), selector)
    }

    /// Returns copies of all matching documents.
    pub fn fetch(&self, selector: &Selector) -> Vec<Document> {
        self.docs
            .read()
            .values()
            .filter(|doc| selector.matches(doc))
            .cloned()
            .collect()
    }

    /// Returns the ids of all stored documents.
    pub fn ids(&self) -> Vec<String> {
        self.docs.read().keys().cloned().collect()
    }

    /// Returns the number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    /// Returns true if the collection holds no documents.
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    pub(crate) fn add_listener(&self, listener: ChangeListener) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.write().push((id, listener));
        id
    }

    pub(crate) fn remove_listener(&self, listener_id: u64) {
        self.listeners.write().retain(|(id, _)| *id != listener_id);
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn notify(&self) {
        // Clone the listener list first: a listener may register or stop
        // observers on this collection while it runs.
        let listeners: Vec<ChangeListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        trace!(collection = %self.name, listeners = listeners.len(), "notifying change");
        for listener in listeners {
            listener();
        }
    }
}
