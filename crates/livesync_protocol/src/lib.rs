//! # livesync Protocol
//!
//! Wire-level types for the livesync live-query protocol.
//!
//! This crate provides:
//! - [`Document`]: a keyed field structure with a unique `_id`
//! - [`FieldDiff`] and [`DeltaSet`]: minimal added/changed/removed deltas
//! - [`ClientMessage`] and [`ServerFrame`]: inbound and outbound frames
//!
//! # Protocol
//!
//! A client invokes remote methods against named collections
//! (`/<collection>/insert|update|remove|sync`) and subscribes to named
//! publications. The server answers with `added`/`changed`/`removed`
//! document frames, `ready`/`nosub` subscription markers, and
//! `result`/`updated` method completions.
//!
//! All types here are pure data: no I/O, no state.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod delta;
mod document;
mod frames;

pub use delta::{CollectionDiffs, CollectionDocs, DeltaSet, DocumentMap, FieldDiff};
pub use document::Document;
pub use frames::{ClientMessage, MethodCall, ServerFrame, SubscribeRequest, UnsubscribeRequest};
