//! The collection store.

use crate::collection::Collection;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A set of named, observable collections.
///
/// Collections are created on first use and live for the store's lifetime.
#[derive(Default)]
pub struct Store {
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the named collection, creating it if needed.
    pub fn collection(&self, name: &str) -> Arc<Collection> {
        if let Some(collection) = self.collections.read().get(name) {
            return Arc::clone(collection);
        }
        let mut collections = self.collections.write();
        Arc::clone(
            collections
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(Collection::new(name))),
        )
    }

    /// Returns the named collection only if it already exists.
    pub fn get(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    /// Returns the names of all existing collections.
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    /// Drops all collections. Intended for tests.
    pub fn clear(&self) {
        self.collections.write().clear();
    }
}
