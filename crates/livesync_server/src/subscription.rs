//! Per-subscription state.

use crate::composer::ObservedTree;
use livesync_protocol::CollectionDocs;
use livesync_store::ChangeListener;
use parking_lot::Mutex;

/// Lifecycle phase of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPhase {
    /// Registered, publication handler not yet run.
    Created,
    /// Publication handler running, initial snapshot being sent.
    Starting,
    /// Initial snapshot sent; live flushes apply.
    Ready,
    /// Stopped; no further frames are sent for this subscription.
    Stopped,
}

impl SubscriptionPhase {
    /// Returns true while the subscription can still produce frames.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Created | Self::Starting | Self::Ready)
    }

    /// Returns true once the subscription has been stopped.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

pub(crate) struct SubscriptionState {
    pub(crate) phase: SubscriptionPhase,
    pub(crate) listener: ChangeListener,
    pub(crate) tree: ObservedTree,
    pub(crate) snapshot: CollectionDocs,
}

/// One client subscription to a publication.
///
/// Flushes serialize on the state mutex, so overlapping change
/// notifications coalesce: a trailing flush re-fetches the freshest
/// snapshot and produces an empty delta.
pub struct Subscription {
    id: String,
    pub(crate) state: Mutex<SubscriptionState>,
}

impl Subscription {
    pub(crate) fn new(id: impl Into<String>, listener: ChangeListener) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(SubscriptionState {
                phase: SubscriptionPhase::Created,
                listener,
                tree: ObservedTree::default(),
                snapshot: CollectionDocs::new(),
            }),
        }
    }

    /// The client-chosen subscription id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The subscription's current phase.
    pub fn phase(&self) -> SubscriptionPhase {
        self.state.lock().phase
    }
}
