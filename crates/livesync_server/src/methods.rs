//! Remote collection methods.
//!
//! Clients call `/<collection>/{insert,update,remove,sync}` method paths.
//! The write path runs synchronously: collection listeners flush affected
//! subscriptions before the write returns, and the manager waits on the
//! update barrier before reporting the result, so every reactive side
//! effect of a call is on the wire by the time its result is.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::manager::SubscriptionManager;
use livesync_protocol::{Document, MethodCall};
use livesync_store::ident::SeededIdStream;
use livesync_store::{Collection, Modifier, Selector};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Dispatches remote method calls against registered collections.
pub struct MethodManager {
    subscriptions: Arc<SubscriptionManager>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    config: ServerConfig,
}

impl MethodManager {
    /// Creates a manager bound to one connection's subscriptions.
    pub fn new(subscriptions: Arc<SubscriptionManager>, config: ServerConfig) -> Self {
        Self {
            subscriptions,
            collections: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Exposes a collection's write methods to the client.
    ///
    /// Registering the same collection twice is a configuration error.
    pub fn register_collection(&self, collection: Arc<Collection>) -> ServerResult<()> {
        let mut collections = self.collections.write();
        let name = collection.name().to_owned();
        if collections.contains_key(&name) {
            return Err(ServerError::DuplicateCollection(name));
        }
        collections.insert(name, collection);
        Ok(())
    }

    /// Dispatches one method call and returns its result value.
    ///
    /// Blocks until every subscription flush triggered by the write has
    /// completed, so the caller can report the result after all reactive
    /// frames.
    pub fn handle_call(&self, call: &MethodCall) -> ServerResult<Value> {
        let (collection_name, operation) = parse_method_path(&call.method)?;
        let collection = self
            .collections
            .read()
            .get(collection_name)
            .cloned()
            .ok_or_else(|| ServerError::UnknownCollection(collection_name.to_owned()))?;
        debug!(method = %call.method, "method call");

        let result = match operation {
            "insert" => self.remote_insert(&collection, call)?,
            "update" => self.remote_update(&collection, call)?,
            "remove" => self.remote_remove(&collection, call)?,
            "sync" => self.remote_sync(&collection, call)?,
            _ => return Err(ServerError::UnknownMethod(call.method.clone())),
        };
        self.subscriptions.when_all_cursors_updated();
        Ok(result)
    }

    fn remote_insert(&self, collection: &Arc<Collection>, call: &MethodCall) -> ServerResult<Value> {
        let value = call
            .params
            .first()
            .cloned()
            .ok_or_else(|| ServerError::InvalidParams("insert expects a document".to_owned()))?;
        let mut doc = Document::from_value(value)
            .map_err(|err| ServerError::InvalidParams(format!("invalid document: {err}")))?;

        let seeded = if bool_option(&call.params, 1, "waitReady") {
            None
        } else {
            self.reconcile_document_id(&mut doc, collection.name(), call.random_seed.as_deref())
        };
        match collection.insert(doc) {
            Ok(id) => Ok(Value::String(id)),
            Err(err) => {
                // The write never landed; take the seeded entry back out
                // so the failed insert leaves remote state untouched.
                if let Some(id) = seeded {
                    self.subscriptions
                        .handle_rejected_remote_insert(collection.name(), &id);
                }
                Err(err.into())
            }
        }
    }

    /// Verifies a client-predicted document id against the call's seed.
    ///
    /// A matching prediction is kept, and the originating connection's
    /// remote state is seeded before the write so the client is not sent
    /// its own insert back; the seeded id is returned so the caller can
    /// retract it if the write fails. A mismatched or unverifiable id is
    /// stripped silently; the store assigns a fresh one.
    fn reconcile_document_id(
        &self,
        doc: &mut Document,
        collection: &str,
        seed: Option<&str>,
    ) -> Option<String> {
        let id = doc.id()?.to_owned();
        let Some(seed) = seed else {
            doc.clear_id();
            return None;
        };
        let namespace = self.config.collection_namespace(collection);
        let expected =
            SeededIdStream::new([seed, namespace.as_str()]).id(self.config.document_id_length);
        if id == expected {
            self.subscriptions
                .handle_accepted_remote_insert(collection, doc.clone())
                .then_some(id)
        } else {
            doc.clear_id();
            None
        }
    }

    fn remote_update(&self, collection: &Arc<Collection>, call: &MethodCall) -> ServerResult<Value> {
        let selector = Selector::from_value(call.params.first().unwrap_or(&Value::Null))?;
        let modifier_value = call
            .params
            .get(1)
            .ok_or_else(|| ServerError::InvalidParams("update expects a modifier".to_owned()))?;
        let modifier = Modifier::from_value(modifier_value)?;
        let multi = bool_option(&call.params, 2, "multi");

        let updated = collection.update(&selector, &modifier, multi);
        Ok(Value::from(updated))
    }

    fn remote_remove(&self, collection: &Arc<Collection>, call: &MethodCall) -> ServerResult<Value> {
        let selector = Selector::from_value(call.params.first().unwrap_or(&Value::Null))?;
        let multi = bool_option(&call.params, 1, "multi");

        let removed = collection.remove(&selector, multi);
        Ok(Value::from(removed.len()))
    }

    /// Removes every stored document whose id is not in the given list and
    /// returns the removed ids.
    fn remote_sync(&self, collection: &Arc<Collection>, call: &MethodCall) -> ServerResult<Value> {
        let ids = call
            .params
            .first()
            .and_then(Value::as_array)
            .ok_or_else(|| ServerError::InvalidParams("sync expects an id list".to_owned()))?;
        let keep: HashSet<&str> = ids
            .iter()
            .map(|id| {
                id.as_str()
                    .ok_or_else(|| ServerError::InvalidParams("ids must be strings".to_owned()))
            })
            .collect::<ServerResult<_>>()?;

        let mut removed = Vec::new();
        for id in collection.ids() {
            if !keep.contains(id.as_str()) {
                collection.remove(&Selector::by_id(id.as_str()), false);
                removed.push(Value::String(id));
            }
        }
        Ok(Value::Array(removed))
    }
}

fn parse_method_path(path: &str) -> ServerResult<(&str, &str)> {
    let unknown = || ServerError::UnknownMethod(path.to_owned());
    let (collection, operation) = path
        .strip_prefix('/')
        .and_then(|rest| rest.split_once('/'))
        .ok_or_else(unknown)?;
    if collection.is_empty() || operation.is_empty() {
        return Err(unknown());
    }
    Ok((collection, operation))
}

fn bool_option(params: &[Value], index: usize, key: &str) -> bool {
    params
        .get(index)
        .and_then(|options| options.get(key))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{MockConnection, ServerConnection};
    use crate::publications::PublicationRegistry;
    use livesync_store::ident::SEED_LENGTH;
    use livesync_store::{ident, Store};
    use serde_json::json;

    struct Fixture {
        store: Arc<Store>,
        subscriptions: Arc<SubscriptionManager>,
        manager: MethodManager,
    }

    fn fixture() -> Fixture {
        let connection = Arc::new(MockConnection::new()) as Arc<dyn ServerConnection>;
        let registry = Arc::new(PublicationRegistry::new());
        let subscriptions = Arc::new(SubscriptionManager::new(connection, registry));
        let store = Arc::new(Store::new());
        let manager = MethodManager::new(Arc::clone(&subscriptions), ServerConfig::default());
        manager.register_collection(store.collection("tasks")).unwrap();
        Fixture {
            store,
            subscriptions,
            manager,
        }
    }

    fn call(method: &str, params: Vec<Value>) -> MethodCall {
        MethodCall {
            id: Some("1".to_owned()),
            method: method.to_owned(),
            params,
            random_seed: None,
        }
    }

    #[test]
    fn method_path_parsing() {
        assert_eq!(parse_method_path("/tasks/insert").unwrap(), ("tasks", "insert"));
        assert!(parse_method_path("tasks/insert").is_err());
        assert!(parse_method_path("/tasks").is_err());
        assert!(parse_method_path("//insert").is_err());
        assert!(parse_method_path("/tasks/").is_err());
    }

    #[test]
    fn unknown_collection_and_operation() {
        let fx = fixture();
        let err = fx.manager.handle_call(&call("/notes/insert", vec![json!({})])).unwrap_err();
        assert!(matches!(err, ServerError::UnknownCollection(_)));

        let err = fx.manager.handle_call(&call("/tasks/upsert", vec![json!({})])).unwrap_err();
        assert!(matches!(err, ServerError::UnknownMethod(_)));
    }

    #[test]
    fn duplicate_collection_registration_is_rejected() {
        let fx = fixture();
        let err = fx
            .manager
            .register_collection(fx.store.collection("tasks"))
            .unwrap_err();
        assert!(matches!(err, ServerError::DuplicateCollection(_)));
    }

    #[test]
    fn insert_without_client_id_assigns_one() {
        let fx = fixture();
        let result = fx
            .manager
            .handle_call(&call("/tasks/insert", vec![json!({"a": 1})]))
            .unwrap();
        let id = result.as_str().unwrap();
        assert_eq!(id.len(), ident::DOCUMENT_ID_LENGTH);
        assert_eq!(fx.store.collection("tasks").len(), 1);
    }

    #[test]
    fn insert_keeps_id_matching_the_seed() {
        let fx = fixture();
        let seed = ident::random_id(SEED_LENGTH);
        let predicted =
            SeededIdStream::new([seed.as_str(), "/collection/tasks"]).id(ident::DOCUMENT_ID_LENGTH);

        let mut request = call("/tasks/insert", vec![json!({"_id": predicted, "a": 1})]);
        request.random_seed = Some(seed);
        let result = fx.manager.handle_call(&request).unwrap();
        assert_eq!(result.as_str(), Some(predicted.as_str()));
    }

    #[test]
    fn insert_strips_unverifiable_id() {
        let fx = fixture();
        // No seed at all.
        let result = fx
            .manager
            .handle_call(&call("/tasks/insert", vec![json!({"_id": "forged", "a": 1})]))
            .unwrap();
        assert_ne!(result.as_str(), Some("forged"));

        // A seed predicting a different id.
        let mut request = call("/tasks/insert", vec![json!({"_id": "forged", "a": 1})]);
        request.random_seed = Some(ident::random_id(SEED_LENGTH));
        let result = fx.manager.handle_call(&request).unwrap();
        assert_ne!(result.as_str(), Some("forged"));
        assert_eq!(fx.store.collection("tasks").len(), 2);
    }

    #[test]
    fn failed_insert_leaves_no_remote_state_behind() {
        let fx = fixture();
        let seed = ident::random_id(SEED_LENGTH);
        let predicted =
            SeededIdStream::new([seed.as_str(), "/collection/tasks"]).id(ident::DOCUMENT_ID_LENGTH);
        fx.store
            .collection("tasks")
            .insert(Document::new(predicted.as_str()))
            .unwrap();

        // A verified optimistic insert that then collides on the id must
        // retract its seeded entry along with the error.
        let mut request = call("/tasks/insert", vec![json!({"_id": predicted, "a": 1})]);
        request.random_seed = Some(seed);
        let err = fx.manager.handle_call(&request).unwrap_err();
        assert!(matches!(err, ServerError::Store(_)));
        assert_eq!(
            fx.subscriptions.remote_reference_count("tasks", &predicted),
            None
        );
    }

    #[test]
    fn insert_with_wait_ready_skips_verification() {
        let fx = fixture();
        let request = call(
            "/tasks/insert",
            vec![json!({"_id": "chosen", "a": 1}), json!({"waitReady": true})],
        );
        let result = fx.manager.handle_call(&request).unwrap();
        assert_eq!(result.as_str(), Some("chosen"));
    }

    #[test]
    fn insert_rejects_non_document_params() {
        let fx = fixture();
        let err = fx.manager.handle_call(&call("/tasks/insert", vec![])).unwrap_err();
        assert!(matches!(err, ServerError::InvalidParams(_)));

        let err = fx
            .manager
            .handle_call(&call("/tasks/insert", vec![json!(42)]))
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidParams(_)));
    }

    #[test]
    fn update_applies_modifier_and_reports_count() {
        let fx = fixture();
        let tasks = fx.store.collection("tasks");
        tasks
            .insert_all(vec![
                Document::new("1").with_field("a", 1),
                Document::new("2").with_field("a", 1),
            ])
            .unwrap();

        let result = fx
            .manager
            .handle_call(&call(
                "/tasks/update",
                vec![json!({"a": 1}), json!({"$set": {"a": 2}}), json!({"multi": true})],
            ))
            .unwrap();
        assert_eq!(result, json!(2));
        assert_eq!(tasks.fetch(&Selector::eq("a", 2)).len(), 2);

        let err = fx
            .manager
            .handle_call(&call("/tasks/update", vec![json!({"a": 2})]))
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidParams(_)));
    }

    #[test]
    fn remove_reports_count() {
        let fx = fixture();
        let tasks = fx.store.collection("tasks");
        tasks
            .insert_all(vec![Document::new("1"), Document::new("2")])
            .unwrap();

        let result = fx
            .manager
            .handle_call(&call("/tasks/remove", vec![json!(null), json!({"multi": true})]))
            .unwrap();
        assert_eq!(result, json!(2));
        assert!(tasks.is_empty());
    }

    #[test]
    fn sync_removes_documents_absent_from_the_list() {
        let fx = fixture();
        let tasks = fx.store.collection("tasks");
        tasks
            .insert_all(vec![Document::new("1"), Document::new("2"), Document::new("4")])
            .unwrap();

        let result = fx
            .manager
            .handle_call(&call("/tasks/sync", vec![json!(["1", "2", "3"])]))
            .unwrap();
        assert_eq!(result, json!(["4"]));
        assert_eq!(tasks.ids(), vec!["1", "2"]);

        // A list covering the whole collection removes nothing.
        let result = fx
            .manager
            .handle_call(&call("/tasks/sync", vec![json!(["1", "2", "3"])]))
            .unwrap();
        assert_eq!(result, json!([]));
    }

    #[test]
    fn sync_rejects_non_string_ids() {
        let fx = fixture();
        let err = fx
            .manager
            .handle_call(&call("/tasks/sync", vec![json!([1, 2])]))
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidParams(_)));

        let err = fx.manager.handle_call(&call("/tasks/sync", vec![])).unwrap_err();
        assert!(matches!(err, ServerError::InvalidParams(_)));
    }
}
