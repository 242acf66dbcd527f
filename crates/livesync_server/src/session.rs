//! Per-connection message dispatch.

use crate::config::ServerConfig;
use crate::connection::ServerConnection;
use crate::error::ServerResult;
use crate::manager::SubscriptionManager;
use crate::methods::MethodManager;
use crate::publications::PublicationRegistry;
use livesync_protocol::ClientMessage;
use livesync_store::{Collection, Store};
use std::sync::Arc;

/// One client connection's view of the server: a subscription manager and
/// a method manager over a shared store and publication registry.
pub struct Session {
    connection: Arc<dyn ServerConnection>,
    subscriptions: Arc<SubscriptionManager>,
    methods: MethodManager,
}

impl Session {
    /// Creates a session for one connection.
    pub fn new(
        connection: Arc<dyn ServerConnection>,
        registry: Arc<PublicationRegistry>,
        config: ServerConfig,
    ) -> Self {
        let subscriptions = Arc::new(SubscriptionManager::new(
            Arc::clone(&connection),
            registry,
        ));
        let methods = MethodManager::new(Arc::clone(&subscriptions), config);
        Self {
            connection,
            subscriptions,
            methods,
        }
    }

    /// Creates a session exposing every collection of a store.
    pub fn with_store(
        connection: Arc<dyn ServerConnection>,
        store: &Store,
        registry: Arc<PublicationRegistry>,
        config: ServerConfig,
    ) -> ServerResult<Self> {
        let session = Self::new(connection, registry, config);
        for name in store.collection_names() {
            session.methods.register_collection(store.collection(&name))?;
        }
        Ok(session)
    }

    /// Exposes a collection's write methods on this session.
    pub fn register_collection(&self, collection: Arc<Collection>) -> ServerResult<()> {
        self.methods.register_collection(collection)
    }

    /// The session's subscription manager.
    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }

    /// Tears the session down after its connection closed: every
    /// subscription is stopped and its cursor observers detached. No
    /// frames are sent.
    pub fn close(&self) {
        self.subscriptions.close();
    }

    /// Dispatches one inbound client message.
    ///
    /// Method calls produce a `result` frame after every reactive side
    /// effect has flushed, then an `updated` frame.
    pub fn handle_message(&self, message: &ClientMessage) -> ServerResult<()> {
        match message {
            ClientMessage::Method(call) => {
                let result = self.methods.handle_call(call)?;
                self.connection.send_result(call.id.as_deref(), &result);
                self.connection.send_updated(call.id.as_deref());
                Ok(())
            }
            ClientMessage::Sub(request) => self.subscriptions.subscribe(request),
            ClientMessage::Unsub(request) => {
                self.subscriptions.unsubscribe(request)?;
                Ok(())
            }
        }
    }
}
