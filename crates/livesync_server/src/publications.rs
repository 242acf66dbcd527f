//! Publication registry.

use crate::connection::ServerConnection;
use crate::error::{ServerError, ServerResult};
use livesync_store::Cursor;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Context handed to a publication handler.
pub struct PublicationContext {
    /// The subscribing connection.
    pub connection: Arc<dyn ServerConnection>,
}

/// A named publication: parameters in, root cursors out.
///
/// Handlers may attach joins to the returned cursors; the whole cursor tree
/// is observed for the lifetime of the subscription.
pub type PublicationHandler =
    Arc<dyn Fn(&PublicationContext, &[Value]) -> Vec<Cursor> + Send + Sync>;

/// Registry of named publications, shared by all connections.
#[derive(Default)]
pub struct PublicationRegistry {
    handlers: RwLock<HashMap<String, PublicationHandler>>,
}

impl PublicationRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a publication under a name.
    ///
    /// Registering the same name twice is a configuration error.
    pub fn publish(&self, name: impl Into<String>, handler: PublicationHandler) -> ServerResult<()> {
        let name = name.into();
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&name) {
            return Err(ServerError::DuplicatePublication(name));
        }
        handlers.insert(name, handler);
        Ok(())
    }

    /// Returns the handler registered under a name.
    pub fn lookup(&self, name: &str) -> Option<PublicationHandler> {
        self.handlers.read().get(name).map(Arc::clone)
    }

    /// Returns true if a publication is registered under this name.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Number of registered publications.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Removes every registered publication.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }
}
