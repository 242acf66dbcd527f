//! # livesync Server
//!
//! Live-query synchronization core: per-connection subscription diffing
//! and write-path reconciliation over an observable collection store.
//!
//! This crate provides:
//! - [`SubscriptionManager`]: publication subscriptions, cross-subscription
//!   reference-counted remote state, coalesced delta flushes
//! - [`MethodManager`]: `/<collection>/{insert,update,remove,sync}` remote
//!   methods with deterministic optimistic-id reconciliation
//! - [`Session`]: one connection's dispatch over both managers
//! - [`PublicationRegistry`]: named publication handlers
//! - [`ServerConnection`]: the outbound frame surface (+ a recording
//!   [`MockConnection`] for tests)
//!
//! # Architecture
//!
//! Each connection owns a [`RemoteState`]: a reference-counted ledger of
//! the documents already sent to that client. Two subscriptions overlapping
//! on a document send it once and remove it only when the last holder
//! unsubscribes. Cursor change notifications are diffed against remote
//! state into minimal added/changed/removed deltas; a counted barrier
//! ([`UpdateBarrier`]) lets the write path report method results only after
//! every reactive side effect has been flushed.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod barrier;
mod composer;
mod config;
mod connection;
mod diff;
mod error;
mod manager;
mod methods;
mod publications;
mod remote;
mod session;
mod subscription;

pub use barrier::{BarrierGuard, UpdateBarrier};
pub use config::ServerConfig;
pub use connection::{MockConnection, ServerConnection};
pub use diff::{
    diff_added_with_remote, diff_changed_with_remote, diff_keyed_objects,
    diff_removed_with_remote, partition_result_sets, KeyedChange,
};
pub use error::{ServerError, ServerResult};
pub use manager::SubscriptionManager;
pub use methods::MethodManager;
pub use publications::{PublicationContext, PublicationHandler, PublicationRegistry};
pub use remote::{RemoteState, TrackedDocument};
pub use session::Session;
pub use subscription::{Subscription, SubscriptionPhase};
