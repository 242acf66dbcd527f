//! Cursor tree observation.
//!
//! A publication returns root cursors, each optionally annotated with a
//! join producing child cursors per parent document. The composer observes
//! the whole tree, keeps per-cursor result snapshots, and merges them into
//! one result set per collection.

use livesync_protocol::{CollectionDocs, DocumentMap};
use livesync_store::{ChangeListener, Cursor, ObserveHandle};
use std::collections::BTreeMap;

/// One observed cursor with its latest results and join children.
pub(crate) struct ObservedCursor {
    cursor: Cursor,
    handle: ObserveHandle,
    latest: DocumentMap,
    children: BTreeMap<String, Vec<ObservedCursor>>,
}

impl ObservedCursor {
    fn observe(cursor: Cursor, listener: &ChangeListener) -> Self {
        let handle = cursor.observe(listener.clone());
        let mut observed = Self {
            cursor,
            handle,
            latest: DocumentMap::new(),
            children: BTreeMap::new(),
        };
        observed.refresh(listener);
        observed
    }

    fn refresh(&mut self, listener: &ChangeListener) {
        let next = self.cursor.fetch_map();

        if self.cursor.has_join() {
            // Rebuild children for parents that are new or whose document
            // changed; the join may derive child selectors from it.
            self.children.retain(|id, children| {
                if next.get(id) == self.latest.get(id) {
                    return true;
                }
                for child in children.iter() {
                    child.stop();
                }
                false
            });
            for (id, doc) in &next {
                if !self.children.contains_key(id) {
                    let children = self
                        .cursor
                        .join_children(doc)
                        .into_iter()
                        .map(|child| ObservedCursor::observe(child, listener))
                        .collect();
                    self.children.insert(id.clone(), children);
                }
            }
        }

        self.latest = next;
        for children in self.children.values_mut() {
            for child in children {
                child.refresh(listener);
            }
        }
    }

    fn stop(&self) {
        self.handle.stop();
        for children in self.children.values() {
            for child in children {
                child.stop();
            }
        }
    }

    fn collect(&self, into: &mut CollectionDocs) {
        let merged = into
            .entry(self.cursor.collection_name().to_owned())
            .or_default();
        for (id, doc) in &self.latest {
            merged.insert(id.clone(), doc.clone());
        }
        for children in self.children.values() {
            for child in children {
                child.collect(into);
            }
        }
    }

    fn count(&self) -> usize {
        1 + self
            .children
            .values()
            .flatten()
            .map(ObservedCursor::count)
            .sum::<usize>()
    }
}

/// The observed cursor tree of one subscription.
#[derive(Default)]
pub(crate) struct ObservedTree {
    roots: Vec<ObservedCursor>,
}

impl ObservedTree {
    /// Observes a set of root cursors, fetching initial results.
    pub(crate) fn observe(cursors: Vec<Cursor>, listener: &ChangeListener) -> Self {
        Self {
            roots: cursors
                .into_iter()
                .map(|cursor| ObservedCursor::observe(cursor, listener))
                .collect(),
        }
    }

    /// Re-fetches every cursor and reconciles join children.
    pub(crate) fn refresh(&mut self, listener: &ChangeListener) {
        for root in &mut self.roots {
            root.refresh(listener);
        }
    }

    /// Merges all cursor results into one document set per collection.
    pub(crate) fn snapshot(&self) -> CollectionDocs {
        let mut merged = CollectionDocs::new();
        for root in &self.roots {
            root.collect(&mut merged);
        }
        merged
    }

    /// Stops every observation in the tree.
    pub(crate) fn stop(&self) {
        for root in &self.roots {
            root.stop();
        }
    }

    /// Number of observed cursors, joins included.
    pub(crate) fn observer_count(&self) -> usize {
        self.roots.iter().map(ObservedCursor::count).sum()
    }
}
