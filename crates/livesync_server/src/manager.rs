//! Subscription lifecycle and delta flushing.

use crate::barrier::UpdateBarrier;
use crate::composer::ObservedTree;
use crate::connection::ServerConnection;
use crate::diff::{
    diff_added_with_remote, diff_changed_with_remote, diff_removed_with_remote,
    partition_result_sets,
};
use crate::error::{ServerError, ServerResult};
use crate::publications::{PublicationContext, PublicationRegistry};
use crate::remote::RemoteState;
use crate::subscription::{Subscription, SubscriptionPhase};
use livesync_protocol::{DeltaSet, Document, SubscribeRequest, UnsubscribeRequest};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Manages one connection's subscriptions and remote state.
///
/// Lock order is fixed: the subscription map is locked only briefly for
/// lookup and registration, a subscription's state mutex is held for the
/// whole of a flush, and the remote state mutex is taken last, only while
/// diffing. Flushes for one subscription therefore serialize; overlapping
/// change notifications coalesce into empty trailing deltas.
pub struct SubscriptionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    connection: Arc<dyn ServerConnection>,
    registry: Arc<PublicationRegistry>,
    remote: Mutex<RemoteState>,
    subscriptions: Mutex<HashMap<String, Arc<Subscription>>>,
    barrier: Arc<UpdateBarrier>,
}

impl SubscriptionManager {
    /// Creates a manager for one connection.
    pub fn new(connection: Arc<dyn ServerConnection>, registry: Arc<PublicationRegistry>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                connection,
                registry,
                remote: Mutex::new(RemoteState::new()),
                subscriptions: Mutex::new(HashMap::new()),
                barrier: Arc::new(UpdateBarrier::new()),
            }),
        }
    }

    /// Starts a subscription: runs the publication handler, observes its
    /// cursor tree, and sends the initial snapshot followed by `ready`.
    ///
    /// Subscribing an id that is already active is a no-op.
    pub fn subscribe(&self, request: &SubscribeRequest) -> ServerResult<()> {
        let handler = self
            .inner
            .registry
            .lookup(&request.name)
            .ok_or_else(|| ServerError::UnknownPublication(request.name.clone()))?;

        let subscription = {
            let mut subs = self.inner.subscriptions.lock();
            if subs.contains_key(&request.id) {
                return Ok(());
            }
            let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
            let sub_id = request.id.clone();
            let listener = Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    ManagerInner::notify_change(&inner, &sub_id);
                }
            });
            let subscription = Arc::new(Subscription::new(request.id.clone(), listener));
            subs.insert(request.id.clone(), Arc::clone(&subscription));
            subscription
        };
        debug!(id = %request.id, name = %request.name, "subscription starting");

        let _flush = self.inner.barrier.begin();
        let mut state = subscription.state.lock();
        if state.phase.is_stopped() {
            return Ok(());
        }
        state.phase = SubscriptionPhase::Starting;

        let context = PublicationContext {
            connection: Arc::clone(&self.inner.connection),
        };
        let cursors = handler(&context, &request.params);
        let listener = state.listener.clone();
        state.tree = ObservedTree::observe(cursors, &listener);
        let snapshot = state.tree.snapshot();

        let delta = DeltaSet {
            added: diff_added_with_remote(&snapshot, &mut self.inner.remote.lock()),
            ..DeltaSet::default()
        };
        state.snapshot = snapshot;
        state.phase = SubscriptionPhase::Ready;

        self.inner.send_delta(&delta);
        self.inner.connection.send_ready(&request.id);
        Ok(())
    }

    /// Stops a subscription: releases its remote references, sends the
    /// resulting removals and `nosub`.
    ///
    /// Returns `Ok(true)` when a subscription was stopped, `Ok(false)` for
    /// an unknown id or an explicit-null id. A request with no id field at
    /// all is a protocol error.
    pub fn unsubscribe(&self, request: &UnsubscribeRequest) -> ServerResult<bool> {
        let id = match &request.id {
            None => return Err(ServerError::MissingSubscriptionId),
            Some(None) => return Ok(false),
            Some(Some(id)) => id,
        };
        let Some(subscription) = self.inner.subscriptions.lock().remove(id) else {
            return Ok(false);
        };
        debug!(id = %id, "subscription stopping");

        let _flush = self.inner.barrier.begin();
        let mut state = subscription.state.lock();
        state.phase = SubscriptionPhase::Stopped;
        state.tree.stop();
        let gone = mem::take(&mut state.snapshot);

        let delta = DeltaSet {
            removed: diff_removed_with_remote(&gone, &mut self.inner.remote.lock()),
            ..DeltaSet::default()
        };
        self.inner.send_delta(&delta);
        self.inner.connection.send_nosub(id);
        Ok(true)
    }

    /// Sends a precomputed delta to the client, in added, changed, removed
    /// order. Empty per-collection entries send nothing.
    pub fn handle_update(&self, delta: &DeltaSet) {
        self.inner.send_delta(delta);
    }

    /// Blocks until every in-flight subscription flush has completed.
    pub fn when_all_cursors_updated(&self) {
        self.inner.barrier.wait_settled();
    }

    /// Seeds remote state for an optimistic insert whose predicted id was
    /// accepted. Must run before the write so the flush it triggers takes
    /// over the seeded reference instead of echoing the document back.
    /// Returns true if a new entry was seeded.
    pub fn handle_accepted_remote_insert(&self, collection: &str, doc: Document) -> bool {
        self.inner.remote.lock().accept_remote_insert(collection, doc)
    }

    /// Retracts a seeded entry after the corresponding write failed, so a
    /// storage error leaves remote state untouched.
    pub fn handle_rejected_remote_insert(&self, collection: &str, id: &str) {
        self.inner.remote.lock().retract_remote_insert(collection, id);
    }

    /// Stops every subscription without sending frames.
    ///
    /// For connection teardown: the client is gone, so removals and
    /// `nosub` have no recipient, but cursor observers must be detached
    /// from the shared store.
    pub fn close(&self) {
        let stopped: Vec<Arc<Subscription>> =
            self.inner.subscriptions.lock().drain().map(|(_, sub)| sub).collect();
        debug!(count = stopped.len(), "closing all subscriptions");
        for subscription in stopped {
            let mut state = subscription.state.lock();
            state.phase = SubscriptionPhase::Stopped;
            state.tree.stop();
            state.snapshot.clear();
        }
    }

    /// Number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }

    /// Reference count the client holds on a document, if tracked.
    pub fn remote_reference_count(&self, collection: &str, id: &str) -> Option<u32> {
        self.inner
            .remote
            .lock()
            .tracked(collection, id)
            .map(|t| t.count)
    }
}

impl ManagerInner {
    /// Flushes one subscription after a collection change notification.
    fn notify_change(inner: &Arc<Self>, sub_id: &str) {
        let Some(subscription) = inner.subscriptions.lock().get(sub_id).cloned() else {
            return;
        };
        let _flush = inner.barrier.begin();
        let mut state = subscription.state.lock();
        if state.phase != SubscriptionPhase::Ready {
            return;
        }

        let listener = state.listener.clone();
        state.tree.refresh(&listener);
        let next = state.tree.snapshot();
        let previous = mem::replace(&mut state.snapshot, next.clone());
        let (fresh, retained, gone) = partition_result_sets(&previous, &next);

        let delta = {
            let mut remote = inner.remote.lock();
            DeltaSet {
                added: diff_added_with_remote(&fresh, &mut remote),
                changed: diff_changed_with_remote(&retained, &mut remote),
                removed: diff_removed_with_remote(&gone, &mut remote),
            }
        };
        trace!(id = %sub_id, empty = delta.is_empty(), "subscription flushed");
        inner.send_delta(&delta);
    }

    fn send_delta(&self, delta: &DeltaSet) {
        for (collection, docs) in &delta.added {
            for (id, doc) in docs {
                self.connection.send_added(collection, id, doc);
            }
        }
        for (collection, diffs) in &delta.changed {
            for (id, diff) in diffs {
                self.connection.send_changed(collection, id, diff);
            }
        }
        for (collection, docs) in &delta.removed {
            for (id, doc) in docs {
                self.connection.send_removed(collection, id, doc);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MockConnection;
    use livesync_protocol::ServerFrame;
    use livesync_store::{Selector, Store};
    use serde_json::json;

    struct Fixture {
        connection: Arc<MockConnection>,
        store: Arc<Store>,
        manager: SubscriptionManager,
    }

    fn fixture() -> Fixture {
        let connection = Arc::new(MockConnection::new());
        let store = Arc::new(Store::new());
        let registry = Arc::new(PublicationRegistry::new());

        let tasks = store.collection("tasks");
        registry
            .publish("allTasks", {
                let tasks = Arc::clone(&tasks);
                Arc::new(move |_, _| vec![tasks.find(Selector::all())])
            })
            .unwrap();
        registry
            .publish("doneTasks", {
                let tasks = Arc::clone(&tasks);
                Arc::new(move |_, _| vec![tasks.find(Selector::eq("done", true))])
            })
            .unwrap();

        let manager = SubscriptionManager::new(
            Arc::clone(&connection) as Arc<dyn ServerConnection>,
            registry,
        );
        Fixture {
            connection,
            store,
            manager,
        }
    }

    fn sub(id: &str, name: &str) -> SubscribeRequest {
        SubscribeRequest {
            id: id.to_owned(),
            name: name.to_owned(),
            params: Vec::new(),
        }
    }

    #[test]
    fn subscribe_sends_snapshot_then_ready() {
        let fx = fixture();
        let tasks = fx.store.collection("tasks");
        tasks
            .insert_all(vec![
                Document::new("1").with_field("done", true),
                Document::new("2").with_field("done", false),
            ])
            .unwrap();

        fx.manager.subscribe(&sub("s1", "allTasks")).unwrap();
        let frames = fx.connection.frames();
        assert_eq!(fx.connection.added_count(), 2);
        assert!(matches!(frames.last(), Some(ServerFrame::Ready { id }) if id == "s1"));
    }

    #[test]
    fn unknown_publication_is_an_error() {
        let fx = fixture();
        let err = fx.manager.subscribe(&sub("s1", "nope")).unwrap_err();
        assert!(matches!(err, ServerError::UnknownPublication(_)));
        assert_eq!(fx.manager.subscription_count(), 0);
    }

    #[test]
    fn duplicate_subscription_id_is_a_noop() {
        let fx = fixture();
        fx.manager.subscribe(&sub("s1", "allTasks")).unwrap();
        fx.connection.clear();
        fx.manager.subscribe(&sub("s1", "allTasks")).unwrap();
        assert!(fx.connection.frames().is_empty());
        assert_eq!(fx.manager.subscription_count(), 1);
    }

    #[test]
    fn overlapping_subscriptions_share_documents() {
        let fx = fixture();
        let tasks = fx.store.collection("tasks");
        tasks.insert(Document::new("1").with_field("done", true)).unwrap();

        fx.manager.subscribe(&sub("s1", "allTasks")).unwrap();
        fx.manager.subscribe(&sub("s2", "doneTasks")).unwrap();
        // The shared doc is sent once, with two references.
        assert_eq!(fx.connection.added_count(), 1);
        assert_eq!(fx.manager.remote_reference_count("tasks", "1"), Some(2));

        // First release keeps the doc at the client.
        fx.manager
            .unsubscribe(&UnsubscribeRequest::of("s2"))
            .unwrap();
        assert_eq!(fx.connection.removed_count(), 0);
        assert_eq!(fx.manager.remote_reference_count("tasks", "1"), Some(1));

        // Last release removes it.
        fx.manager
            .unsubscribe(&UnsubscribeRequest::of("s1"))
            .unwrap();
        assert_eq!(fx.connection.removed_count(), 1);
        assert_eq!(fx.manager.remote_reference_count("tasks", "1"), None);
    }

    #[test]
    fn live_changes_flush_minimal_deltas() {
        let fx = fixture();
        let tasks = fx.store.collection("tasks");
        fx.manager.subscribe(&sub("s1", "allTasks")).unwrap();
        fx.connection.clear();

        tasks.insert(Document::new("1").with_field("done", false)).unwrap();
        fx.manager.when_all_cursors_updated();
        assert_eq!(fx.connection.added_count(), 1);

        tasks.update(
            &Selector::by_id("1"),
            &livesync_store::Modifier::from_value(&json!({"$set": {"done": true}})).unwrap(),
            false,
        );
        fx.manager.when_all_cursors_updated();
        assert_eq!(fx.connection.changed_count(), 1);

        tasks.remove(&Selector::by_id("1"), false);
        fx.manager.when_all_cursors_updated();
        assert_eq!(fx.connection.removed_count(), 1);
    }

    #[test]
    fn unsubscribe_without_id_field_is_a_protocol_error() {
        let fx = fixture();
        let err = fx
            .manager
            .unsubscribe(&UnsubscribeRequest { id: None })
            .unwrap_err();
        assert!(matches!(err, ServerError::MissingSubscriptionId));
    }

    #[test]
    fn unsubscribe_null_or_unknown_id_is_a_noop() {
        let fx = fixture();
        assert!(!fx.manager.unsubscribe(&UnsubscribeRequest::null()).unwrap());
        assert!(!fx.manager.unsubscribe(&UnsubscribeRequest::of("s9")).unwrap());
        assert_eq!(fx.connection.nosub_count(), 0);
    }

    #[test]
    fn unsubscribe_sends_removals_then_nosub() {
        let fx = fixture();
        let tasks = fx.store.collection("tasks");
        tasks.insert(Document::new("1")).unwrap();
        fx.manager.subscribe(&sub("s1", "allTasks")).unwrap();
        fx.connection.clear();

        assert!(fx.manager.unsubscribe(&UnsubscribeRequest::of("s1")).unwrap());
        let frames = fx.connection.frames();
        assert!(matches!(frames[0], ServerFrame::Removed { .. }));
        assert!(matches!(&frames[1], ServerFrame::Nosub { id } if id == "s1"));
    }

    #[test]
    fn accepted_remote_insert_suppresses_echo() {
        let fx = fixture();
        let tasks = fx.store.collection("tasks");
        fx.manager.subscribe(&sub("s1", "allTasks")).unwrap();
        fx.connection.clear();

        let doc = Document::new("client_id").with_field("a", 1);
        assert!(fx.manager.handle_accepted_remote_insert("tasks", doc.clone()));
        tasks.insert(doc).unwrap();
        fx.manager.when_all_cursors_updated();

        // The subscription took over the seeded reference: one holder,
        // count one, no echo.
        assert_eq!(fx.connection.added_count(), 0);
        assert_eq!(fx.manager.remote_reference_count("tasks", "client_id"), Some(1));

        // The single holder releasing the doc must reach the client.
        tasks.remove(&Selector::by_id("client_id"), false);
        fx.manager.when_all_cursors_updated();
        assert_eq!(fx.connection.removed_count(), 1);
    }

    #[test]
    fn rejected_remote_insert_rolls_back_the_seed() {
        let fx = fixture();
        fx.manager.subscribe(&sub("s1", "allTasks")).unwrap();

        let doc = Document::new("client_id").with_field("a", 1);
        assert!(fx.manager.handle_accepted_remote_insert("tasks", doc));
        fx.manager.handle_rejected_remote_insert("tasks", "client_id");
        assert_eq!(fx.manager.remote_reference_count("tasks", "client_id"), None);

        // With the ghost entry gone the doc still reaches the client when
        // it genuinely appears later.
        fx.connection.clear();
        fx.store.collection("tasks").insert(Document::new("client_id")).unwrap();
        fx.manager.when_all_cursors_updated();
        assert_eq!(fx.connection.added_count(), 1);
    }
}
