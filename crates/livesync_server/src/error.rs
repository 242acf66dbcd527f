//! Error types for the server core.

use livesync_store::StoreError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the live-query server core.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A publication with this name is already registered.
    #[error("publication already registered: {0}")]
    DuplicatePublication(String),

    /// A handler set for this collection is already registered.
    #[error("collection already registered: {0}")]
    DuplicateCollection(String),

    /// No publication is registered under this name.
    #[error("unknown publication: {0}")]
    UnknownPublication(String),

    /// No handler set is registered for this collection.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// The method path names no supported operation.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// An unsubscribe request carried no id field at all.
    #[error("unsubscribe request carries no id field")]
    MissingSubscriptionId,

    /// Method parameters do not match the operation's signature.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// An underlying store error, propagated unchanged.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ServerError {
    /// Returns true for fatal registration-time configuration errors.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ServerError::DuplicatePublication(_) | ServerError::DuplicateCollection(_)
        )
    }

    /// Returns true for per-request protocol errors.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            ServerError::UnknownPublication(_)
                | ServerError::UnknownCollection(_)
                | ServerError::UnknownMethod(_)
                | ServerError::MissingSubscriptionId
                | ServerError::InvalidParams(_)
        )
    }
}
