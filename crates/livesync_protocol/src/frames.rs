//! Inbound and outbound protocol frames.

use crate::delta::FieldDiff;
use crate::document::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A remote method invocation against a collection.
///
/// The method path has the form `/<collection>/<operation>` where the
/// operation is one of `insert`, `update`, `remove`, or `sync`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    /// Client-assigned call id, echoed on `result` and `updated`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Method path, e.g. `/tasks/insert`.
    pub method: String,
    /// Positional parameters.
    #[serde(default)]
    pub params: Vec<Value>,
    /// Per-call random seed for deterministic id reconciliation.
    #[serde(rename = "randomSeed", default, skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<String>,
}

/// A request to start a subscription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Client-assigned subscription id.
    pub id: String,
    /// Publication name.
    pub name: String,
    /// Parameters passed to the publication handler.
    #[serde(default)]
    pub params: Vec<Value>,
}

/// A request to stop a subscription.
///
/// The id is a double `Option` so that a frame with no `id` field at all
/// (malformed, an error) is distinguishable from an explicit `"id": null`
/// (well-formed, a no-op).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    /// Subscription id: absent, explicit null, or a value.
    #[serde(
        default,
        deserialize_with = "present_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Option<String>>,
}

/// Wraps a present field in `Some` so an absent field (outer `None`, via
/// the `default`) stays distinguishable from an explicit null (inner
/// `None`). Plain serde folds both into the outer `None`.
fn present_field<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl UnsubscribeRequest {
    /// Creates a request for the given subscription id.
    pub fn of(id: impl Into<String>) -> Self {
        Self {
            id: Some(Some(id.into())),
        }
    }

    /// Creates a request with an explicit null id.
    pub fn null() -> Self {
        Self { id: Some(None) }
    }
}

/// An inbound frame from a client connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Remote method invocation.
    Method(MethodCall),
    /// Start a subscription.
    Sub(SubscribeRequest),
    /// Stop a subscription.
    Unsub(UnsubscribeRequest),
}

/// An outbound frame to a client connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum ServerFrame {
    /// A document the client does not have yet.
    Added {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// The full document.
        doc: Document,
    },
    /// A field-level change to a document the client has.
    Changed {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// Cleared and changed fields.
        diff: FieldDiff,
    },
    /// A document no subscription needs anymore.
    Removed {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// The document as last known.
        doc: Document,
    },
    /// The subscription's initial snapshot is complete.
    Ready {
        /// Subscription id.
        id: String,
    },
    /// The subscription was stopped.
    Nosub {
        /// Subscription id.
        id: String,
    },
    /// A method call completed.
    Result {
        /// Client call id, if one was supplied.
        id: Option<String>,
        /// The method's return value.
        result: Value,
    },
    /// All reactive side effects of a method call have been sent.
    Updated {
        /// Client call id, if one was supplied.
        id: Option<String>,
    },
}
