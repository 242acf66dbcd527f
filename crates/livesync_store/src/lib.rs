//! # livesync Store
//!
//! In-memory live-query collection store.
//!
//! This crate provides the storage capability the livesync server consumes:
//! - [`Store`] and [`Collection`]: named document collections
//! - [`Selector`] and [`Modifier`]: the minimal write-path query surface
//! - [`Cursor`]: a live, observable query result set with join annotations
//! - [`ident`]: random and seeded deterministic document id generation
//!
//! # Observation
//!
//! Writes notify cursor observers synchronously, after the write lock is
//! released and only when the write succeeded. Observers re-fetch and diff
//! on notification; the store does not compute diffs itself.
//!
//! ```
//! use livesync_store::{Selector, Store};
//! use livesync_protocol::Document;
//!
//! let store = Store::new();
//! let tasks = store.collection("tasks");
//! let id = tasks.insert(Document::anonymous().with_field("title", "ship it"))?;
//! assert_eq!(tasks.find(Selector::by_id(id.as_str())).fetch().len(), 1);
//! # Ok::<(), livesync_store::StoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod collection;
mod cursor;
mod error;
pub mod ident;
mod modifier;
mod selector;
mod store;

pub use collection::{ChangeListener, Collection};
pub use cursor::{Cursor, JoinFn, ObserveHandle};
pub use error::{StoreError, StoreResult};
pub use modifier::Modifier;
pub use selector::Selector;
pub use store::Store;
