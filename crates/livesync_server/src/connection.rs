//! Outbound connection surface.

use livesync_protocol::{Document, FieldDiff, ServerFrame};
use parking_lot::Mutex;
use serde_json::Value;

/// The outbound frame surface of one client connection.
///
/// This trait abstracts the transport layer; implementations are expected
/// to buffer or queue frames, so sends are infallible from the core's
/// point of view. Frame ordering per connection must be preserved.
pub trait ServerConnection: Send + Sync {
    /// Sends a document the client does not have yet.
    fn send_added(&self, collection: &str, id: &str, doc: &Document);

    /// Sends a field-level change to a document the client has.
    fn send_changed(&self, collection: &str, id: &str, diff: &FieldDiff);

    /// Sends a document removal.
    fn send_removed(&self, collection: &str, id: &str, doc: &Document);

    /// Marks a subscription's initial snapshot as complete.
    fn send_ready(&self, sub_id: &str);

    /// Marks a subscription as stopped.
    fn send_nosub(&self, sub_id: &str);

    /// Sends a method call result.
    fn send_result(&self, call_id: Option<&str>, result: &Value);

    /// Signals that all reactive side effects of a method call were sent.
    fn send_updated(&self, call_id: Option<&str>);
}

/// A connection that records every frame, for testing.
#[derive(Default)]
pub struct MockConnection {
    frames: Mutex<Vec<ServerFrame>>,
}

impl MockConnection {
    /// Creates an empty mock connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded frames, in send order.
    pub fn frames(&self) -> Vec<ServerFrame> {
        self.frames.lock().clone()
    }

    /// Discards all recorded frames.
    pub fn clear(&self) {
        self.frames.lock().clear();
    }

    fn count(&self, matcher: impl Fn(&ServerFrame) -> bool) -> usize {
        self.frames.lock().iter().filter(|f| matcher(f)).count()
    }

    /// Number of `added` frames sent.
    pub fn added_count(&self) -> usize {
        self.count(|f| matches!(f, ServerFrame::Added { .. }))
    }

    /// Number of `changed` frames sent.
    pub fn changed_count(&self) -> usize {
        self.count(|f| matches!(f, ServerFrame::Changed { .. }))
    }

    /// Number of `removed` frames sent.
    pub fn removed_count(&self) -> usize {
        self.count(|f| matches!(f, ServerFrame::Removed { .. }))
    }

    /// Number of `ready` frames sent.
    pub fn ready_count(&self) -> usize {
        self.count(|f| matches!(f, ServerFrame::Ready { .. }))
    }

    /// Number of `nosub` frames sent.
    pub fn nosub_count(&self) -> usize {
        self.count(|f| matches!(f, ServerFrame::Nosub { .. }))
    }

    /// Number of `result` frames sent.
    pub fn result_count(&self) -> usize {
        self.count(|f| matches!(f, ServerFrame::Result { .. }))
    }

    /// Number of `updated` frames sent.
    pub fn updated_count(&self) -> usize {
        self.count(|f| matches!(f, ServerFrame::Updated { .. }))
    }
}

impl ServerConnection for MockConnection {
    fn send_added(&self, collection: &str, id: &str, doc: &Document) {
        self.frames.lock().push(ServerFrame::Added {
            collection: collection.to_owned(),
            id: id.to_owned(),
            doc: doc.clone(),
        });
    }

    fn send_changed(&self, collection: &str, id: &str, diff: &FieldDiff) {
        self.frames.lock().push(ServerFrame::Changed {
            collection: collection.to_owned(),
            id: id.to_owned(),
            diff: diff.clone(),
        });
    }

    fn send_removed(&self, collection: &str, id: &str, doc: &Document) {
        self.frames.lock().push(ServerFrame::Removed {
            collection: collection.to_owned(),
            id: id.to_owned(),
            doc: doc.clone(),
        });
    }

    fn send_ready(&self, sub_id: &str) {
        self.frames.lock().push(ServerFrame::Ready {
            id: sub_id.to_owned(),
        });
    }

    fn send_nosub(&self, sub_id: &str) {
        self.frames.lock().push(ServerFrame::Nosub {
            id: sub_id.to_owned(),
        });
    }

    fn send_result(&self, call_id: Option<&str>, result: &Value) {
        self.frames.lock().push(ServerFrame::Result {
            id: call_id.map(str::to_owned),
            result: result.clone(),
        });
    }

    fn send_updated(&self, call_id: Option<&str>) {
        self.frames.lock().push(ServerFrame::Updated {
            id: call_id.map(str::to_owned),
        });
    }
}
