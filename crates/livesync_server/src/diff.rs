//! Keyed diffing against remote state.
//!
//! These functions turn raw cursor result sets into the minimal deltas a
//! client needs, consulting and updating the connection's reference-counted
//! [`RemoteState`] so that documents shared by several subscriptions are
//! sent once and removed only when the last holder releases them.

use crate::remote::{RemoteState, TrackedDocument};
use livesync_protocol::{CollectionDiffs, CollectionDocs, DocumentMap, FieldDiff};
use std::collections::BTreeMap;

/// One key of the union walked by [`diff_keyed_objects`].
#[derive(Debug)]
pub enum KeyedChange<'a, V> {
    /// Key present only in the left map.
    LeftOnly(&'a str, &'a V),
    /// Key present only in the right map.
    RightOnly(&'a str, &'a V),
    /// Key present in both maps.
    Both(&'a str, &'a V, &'a V),
}

/// Walks the key union of two maps, classifying each key.
///
/// The visitor receives every key exactly once as a [`KeyedChange`], so one
/// closure can fold all three cases into shared state. Keys are visited in
/// sorted order within each map: left keys first, then right-only keys.
pub fn diff_keyed_objects<'a, V, F>(
    left: &'a BTreeMap<String, V>,
    right: &'a BTreeMap<String, V>,
    mut visit: F,
) where
    F: FnMut(KeyedChange<'a, V>),
{
    for (key, left_value) in left {
        match right.get(key) {
            Some(right_value) => visit(KeyedChange::Both(key, left_value, right_value)),
            None => visit(KeyedChange::LeftOnly(key, left_value)),
        }
    }
    for (key, right_value) in right {
        if !left.contains_key(key) {
            visit(KeyedChange::RightOnly(key, right_value));
        }
    }
}

/// Absorbs newly observed documents into remote state.
///
/// Documents the client does not have yet get a reference count of one and
/// are returned for sending. Documents already tracked have their count
/// incremented silently; the copy already at the client stays
/// authoritative. An entry seeded by an accepted optimistic insert is
/// absorbed instead: the first subscription to cover the document takes
/// over the seeded reference rather than adding its own, so the count
/// matches the number of holding subscriptions. The result carries an
/// entry for every input collection, possibly empty.
pub fn diff_added_with_remote(new_docs: &CollectionDocs, remote: &mut RemoteState) -> CollectionDocs {
    let mut report = CollectionDocs::new();
    for (collection, docs) in new_docs {
        let tracked = remote.entry(collection);
        let out = report.entry(collection.clone()).or_default();
        for (id, doc) in docs {
            match tracked.get_mut(id) {
                Some(entry) if entry.seeded => entry.seeded = false,
                Some(entry) => entry.count += 1,
                None => {
                    tracked.insert(
                        id.clone(),
                        TrackedDocument {
                            count: 1,
                            seeded: false,
                            doc: doc.clone(),
                        },
                    );
                    out.insert(id.clone(), doc.clone());
                }
            }
        }
    }
    report
}

/// Computes field-level diffs for changed documents the client has.
///
/// Each input document tracked in remote state yields one [`FieldDiff`]
/// (possibly empty) against the copy the client holds, and the tracked copy
/// is replaced by the new one. Documents the client does not have are
/// ignored. The result carries an entry for every input collection.
pub fn diff_changed_with_remote(
    new_docs: &CollectionDocs,
    remote: &mut RemoteState,
) -> CollectionDiffs {
    let mut report = CollectionDiffs::new();
    for (collection, docs) in new_docs {
        let out = report.entry(collection.clone()).or_default();
        let Some(tracked) = remote.get_mut(collection) else {
            continue;
        };
        for (id, doc) in docs {
            let Some(entry) = tracked.get_mut(id) else {
                continue;
            };
            let mut diff = FieldDiff::default();
            diff_keyed_objects(entry.doc.fields(), doc.fields(), |change| match change {
                KeyedChange::LeftOnly(field, _) => diff.cleared.push(field.to_owned()),
                KeyedChange::RightOnly(field, value) => {
                    diff.fields.insert(field.to_owned(), value.clone());
                }
                KeyedChange::Both(field, old, new) => {
                    if old != new {
                        diff.fields.insert(field.to_owned(), new.clone());
                    }
                }
            });
            entry.doc = doc.clone();
            out.insert(id.clone(), diff);
        }
    }
    report
}

/// Releases references for documents a subscription no longer observes.
///
/// Each input document decrements its reference count; at zero the entry is
/// deleted and the passed-in document is reported for removal. Documents
/// still held by another subscription, or not tracked at all, produce no
/// report. The result carries an entry for every input collection.
pub fn diff_removed_with_remote(
    gone_docs: &CollectionDocs,
    remote: &mut RemoteState,
) -> CollectionDocs {
    let mut report = CollectionDocs::new();
    for (collection, docs) in gone_docs {
        let out = report.entry(collection.clone()).or_default();
        let Some(tracked) = remote.get_mut(collection) else {
            continue;
        };
        for (id, doc) in docs {
            let Some(entry) = tracked.get_mut(id) else {
                continue;
            };
            entry.count -= 1;
            if entry.count == 0 {
                tracked.remove(id);
                out.insert(id.clone(), doc.clone());
            }
        }
    }
    report
}

/// Splits a subscription's previous and next snapshots into fresh, retained
/// and gone document sets.
///
/// Fresh documents appear only in `next`, gone documents only in
/// `previous`. Retained documents appear in both but only when their
/// content differs; unchanged documents drop out entirely so a no-op flush
/// produces an empty delta.
pub fn partition_result_sets(
    previous: &CollectionDocs,
    next: &CollectionDocs,
) -> (CollectionDocs, CollectionDocs, CollectionDocs) {
    let mut fresh = CollectionDocs::new();
    let mut retained = CollectionDocs::new();
    let mut gone = CollectionDocs::new();

    for (collection, next_docs) in next {
        let empty = DocumentMap::new();
        let prev_docs = previous.get(collection).unwrap_or(&empty);
        for (id, doc) in next_docs {
            match prev_docs.get(id) {
                None => {
                    fresh
                        .entry(collection.clone())
                        .or_default()
                        .insert(id.clone(), doc.clone());
                }
                Some(prev) if prev != doc => {
                    retained
                        .entry(collection.clone())
                        .or_default()
                        .insert(id.clone(), doc.clone());
                }
                Some(_) => {}
            }
        }
    }
    for (collection, prev_docs) in previous {
        let empty = DocumentMap::new();
        let next_docs = next.get(collection).unwrap_or(&empty);
        for (id, doc) in prev_docs {
            if !next_docs.contains_key(id) {
                gone.entry(collection.clone())
                    .or_default()
                    .insert(id.clone(), doc.clone());
            }
        }
    }

    (fresh, retained, gone)
}
