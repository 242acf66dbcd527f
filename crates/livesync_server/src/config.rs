//! Server configuration.

/// Configuration for one connection's managers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Length of generated and verified document ids.
    pub document_id_length: usize,
    /// Namespace prefix mixed into seeded id derivation.
    pub id_namespace_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            document_id_length: livesync_store::ident::DOCUMENT_ID_LENGTH,
            id_namespace_prefix: "/collection/".to_owned(),
        }
    }
}

impl ServerConfig {
    /// Sets the document id length.
    #[must_use]
    pub fn with_document_id_length(mut self, length: usize) -> Self {
        self.document_id_length = length;
        self
    }

    /// Returns the seeded-id namespace for a collection, e.g.
    /// `/collection/tasks`.
    pub fn collection_namespace(&self, collection: &str) -> String {
        format!("{}{}", self.id_namespace_prefix, collection)
    }
}
