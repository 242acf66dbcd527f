//! Error types for the store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the collection store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A document with this id already exists in the collection.
    #[error("duplicate document id in collection {collection}: {id}")]
    DuplicateId {
        /// Collection name.
        collection: String,
        /// Offending document id.
        id: String,
    },

    /// The selector value is not a valid equality selector.
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// The modifier value uses an unsupported shape or operator.
    #[error("invalid modifier: {0}")]
    InvalidModifier(String),
}
