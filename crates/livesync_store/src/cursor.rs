//! Live, observable query result sets.

use crate::collection::{ChangeListener, Collection};
use crate::selector::Selector;
use livesync_protocol::{Document, DocumentMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A join function deriving child cursors from a parent document.
pub type JoinFn = Arc<dyn Fn(&Document) -> Vec<Cursor> + Send + Sync>;

/// A live query over one collection.
///
/// A cursor is cheap to clone and carries no result state of its own;
/// [`fetch`](Cursor::fetch) snapshots the current matches. A cursor may be
/// annotated with a [`join`](Cursor::join) function producing dependent
/// child cursors per document of its result set.
#[derive(Clone)]
pub struct Cursor {
    collection: Arc<Collection>,
    selector: Selector,
    join: Option<JoinFn>,
}

impl Cursor {
    pub(crate) fn new(collection: Arc<Collection>, selector: Selector) -> Self {
        Self {
            collection,
            selector,
            join: None,
        }
    }

    /// Annotates the cursor with a join function.
    #[must_use]
    pub fn join<F>(mut self, join: F) -> Self
    where
        F: Fn(&Document) -> Vec<Cursor> + Send + Sync + 'static,
    {
        self.join = Some(Arc::new(join));
        self
    }

    /// Returns the name of the queried collection.
    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    /// Returns true if the cursor carries a join annotation.
    pub fn has_join(&self) -> bool {
        self.join.is_some()
    }

    /// Evaluates the join for one parent document.
    ///
    /// Returns an empty set when the cursor has no join annotation.
    pub fn join_children(&self, parent: &Document) -> Vec<Cursor> {
        match &self.join {
            Some(join) => join(parent),
            None => Vec::new(),
        }
    }

    /// Snapshots the current matching documents.
    pub fn fetch(&self) -> Vec<Document> {
        self.collection.fetch(&self.selector)
    }

    /// Snapshots the current matching documents, keyed by id.
    pub fn fetch_map(&self) -> DocumentMap {
        self.fetch()
            .into_iter()
            .filter_map(|doc| doc.id().map(str::to_owned).map(|id| (id, doc)))
            .collect()
    }

    /// Starts observing the cursor's collection for changes.
    ///
    /// The listener fires on every committed write to the collection; the
    /// observer re-fetches and diffs. Observation runs until the returned
    /// handle is stopped.
    pub fn observe(&self, listener: ChangeListener) -> ObserveHandle {
        let listener_id = self.collection.add_listener(listener);
        ObserveHandle {
            collection: Arc::clone(&self.collection),
            listener_id,
            stopped: AtomicBool::new(false),
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("collection", &self.collection.name())
            .field("selector", &self.selector)
            .field("join", &self.join.is_some())
            .finish()
    }
}

/// Handle to an active cursor observation.
///
/// Teardown is explicit: call [`stop`](ObserveHandle::stop). Stopping twice
/// is a no-op.
pub struct ObserveHandle {
    collection: Arc<Collection>,
    listener_id: u64,
    stopped: AtomicBool,
}

impl fmt::Debug for ObserveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserveHandle")
            .field("collection", &self.collection.name())
            .field("listener_id", &self.listener_id)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl ObserveHandle {
    /// Stops the observation.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.collection.remove_listener(self.listener_id);
        }
    }

    /// Returns true if the observation has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
