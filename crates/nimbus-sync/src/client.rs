//! # Client
//!
//! Owns everything a set of collections shares: configuration, session,
//! local persistence, the network and the sync queue. There are no
//! process-wide singletons; pass the client (or its collections) around.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Client                                     │
//! │                                                                         │
//! │   ClientConfig ─┐                                                       │
//! │   Session ──────┼──► HttpNetwork (or injected Network)                 │
//! │                 │                                                       │
//! │   Persistence ──┴──► CacheRegistry ──► SyncQueue (one ledger)          │
//! │   (SQLite file or memory)      │              │                         │
//! │                                ▼              ▼                         │
//! │                collection("books", Cache) ──► Collection               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use nimbus_core::{PendingOperation, SYNC_COLLECTION, SYNC_KEY_COLLECTION};
use nimbus_db::{CacheRegistry, Database, DbConfig, MemoryPersistence, Persistence};
use tracing::info;

use crate::config::ClientConfig;
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::network::{HttpNetwork, Network};
use crate::queue::{PushResult, SyncQueue};
use crate::session::Session;
use crate::store::{Collection, CollectionOptions, DataStoreType, StoreMode};

pub struct Client {
    config: Arc<ClientConfig>,
    session: Arc<Session>,
    stores: Arc<CacheRegistry>,
    network: Arc<dyn Network>,
    queue: SyncQueue,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("app_key", &self.config.app.key)
            .field("host", &self.config.api.host)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Builds a client with the default backends for `config`.
    pub async fn new(config: ClientConfig) -> SyncResult<Self> {
        ClientBuilder::new(config).build().await
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// A handle on `name` in the given mode.
    ///
    /// ## Errors
    /// `SyncError::Parameter` for an empty name or one of the ledger's
    /// reserved collections.
    pub fn collection(&self, name: &str, store_type: DataStoreType) -> SyncResult<Collection> {
        if name.trim().is_empty() {
            return Err(SyncError::Parameter("collection name must not be empty".into()));
        }
        if name == SYNC_COLLECTION || name == SYNC_KEY_COLLECTION {
            return Err(SyncError::Parameter(format!("{name} is reserved")));
        }

        Ok(Collection::new(
            StoreMode::from(store_type),
            self.stores.store(name),
            SyncEngine::new(name, self.queue.clone()),
            self.network.clone(),
            CollectionOptions {
                timeout: self.config.timeout(),
                delta_fetch: self.config.sync.delta_fetch,
            },
        ))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn sync_queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Pushes pending operations of every collection.
    pub async fn push_all(&self) -> SyncResult<Vec<PushResult>> {
        self.queue.push(None).await
    }

    pub async fn pending_sync_count(&self) -> SyncResult<usize> {
        self.queue.count(None).await
    }

    pub async fn pending_sync_entities(&self) -> SyncResult<Vec<PendingOperation>> {
        self.queue.entities(None).await
    }

    /// Wipes the local cache of every collection, pending operations and
    /// the key counter included.
    pub async fn clear_cache(&self) -> SyncResult<u64> {
        let removed = self.stores.clear_all().await?;
        info!(app_key = %self.config.app.key, removed, "Local cache cleared");
        Ok(removed)
    }

    /// Closes local persistence. Collections of this client fail afterwards.
    pub async fn shutdown(&self) {
        self.stores.persistence().close().await;
        info!(app_key = %self.config.app.key, "Client shut down");
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for a [`Client`] with injectable backends.
pub struct ClientBuilder {
    config: ClientConfig,
    persistence: Option<Arc<dyn Persistence>>,
    network: Option<Arc<dyn Network>>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        ClientBuilder {
            config,
            persistence: None,
            network: None,
        }
    }

    /// Uses `persistence` instead of the configured storage.
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Uses `network` instead of HTTP to the configured host.
    pub fn with_network(mut self, network: Arc<dyn Network>) -> Self {
        self.network = Some(network);
        self
    }

    /// Validates the config and wires the client together.
    ///
    /// Without injected persistence, `storage.path` selects a SQLite file;
    /// no path keeps the cache in memory.
    pub async fn build(self) -> SyncResult<Client> {
        self.config.validate()?;
        let config = Arc::new(self.config);
        let session = Arc::new(Session::new(&config.app));

        let persistence: Arc<dyn Persistence> = match (self.persistence, &config.storage.path) {
            (Some(persistence), _) => persistence,
            (None, Some(path)) => Arc::new(Database::new(DbConfig::new(path)).await?),
            (None, None) => Arc::new(MemoryPersistence::new()),
        };

        let network: Arc<dyn Network> = match self.network {
            Some(network) => network,
            None => Arc::new(HttpNetwork::new(&config.api.host, session.clone())?),
        };

        let stores = Arc::new(CacheRegistry::new(
            persistence,
            config.api.namespace.as_str(),
            config.app.key.as_str(),
        ));
        let queue = SyncQueue::new(
            stores.clone(),
            network.clone(),
            config.sync.push_batch_size,
            config.timeout(),
        );

        info!(
            app_key = %config.app.key,
            host = %config.api.host,
            persistent = config.storage.path.is_some(),
            "Client initialized"
        );

        Ok(Client {
            config,
            session,
            stores,
            network,
            queue,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::MockNetwork;
    use nimbus_core::Entity;
    use nimbus_db::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_shutdown_closes_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let client = Client::builder(ClientConfig::new("kid_app", "secret"))
            .with_persistence(Arc::new(db))
            .with_network(Arc::new(MockNetwork::new()))
            .build()
            .await
            .unwrap();
        let books = client.collection("books", DataStoreType::Sync).unwrap();
        books.save(Entity::from_value(json!({"_id": "b1"})).unwrap()).await.unwrap();

        client.shutdown().await;
        assert!(books.find(None).await.is_err());
    }

    async fn client(network: Arc<MockNetwork>) -> Client {
        Client::builder(ClientConfig::new("kid_app", "secret").push_batch_size(2))
            .with_network(network)
            .build()
            .await
            .unwrap()
    }

    fn entity(value: serde_json::Value) -> Entity {
        Entity::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let err = Client::new(ClientConfig::default()).await.unwrap_err();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_collection_names_are_checked() {
        let client = client(Arc::new(MockNetwork::new())).await;
        assert!(client.collection("", DataStoreType::Cache).is_err());
        assert!(client.collection(SYNC_COLLECTION, DataStoreType::Sync).is_err());
        assert_eq!(client.collection("books", DataStoreType::Sync).unwrap().name(), "books");
    }

    #[tokio::test]
    async fn test_collections_share_one_ledger() {
        let network = Arc::new(MockNetwork::new());
        let client = client(network.clone()).await;
        let books = client.collection("books", DataStoreType::Sync).unwrap();
        let films = client.collection("films", DataStoreType::Sync).unwrap();

        books.save(entity(json!({"_id": "b1"}))).await.unwrap();
        books.save(entity(json!({"_id": "b2"}))).await.unwrap();
        films.save(entity(json!({"_id": "f1"}))).await.unwrap();
        films.remove_by_id("f1").await.unwrap();

        assert_eq!(client.pending_sync_count().await.unwrap(), 3);
        assert_eq!(books.pending_sync_count(None).await.unwrap(), 2);

        let results = client.push_all().await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(PushResult::is_success));
        assert_eq!(network.requests().iter().filter(|r| r.method == Method::Delete).count(), 1);
        assert_eq!(client.pending_sync_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_id_in_two_collections_pushes_both() {
        let network = Arc::new(MockNetwork::new());
        let client = client(network.clone()).await;
        let books = client.collection("books", DataStoreType::Sync).unwrap();
        let films = client.collection("films", DataStoreType::Sync).unwrap();

        books.save(entity(json!({"_id": "x1", "title": "Dune"}))).await.unwrap();
        films.save(entity(json!({"_id": "x1", "title": "Alien"}))).await.unwrap();

        assert_eq!(client.pending_sync_count().await.unwrap(), 2);
        assert_eq!(client.pending_sync_entities().await.unwrap().len(), 2);

        let results = client.push_all().await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(PushResult::is_success));

        let mut paths: Vec<String> = network.requests().into_iter().map(|r| r.path).collect();
        paths.sort();
        assert_eq!(paths, vec!["/appdata/kid_app/books/x1", "/appdata/kid_app/films/x1"]);
        assert_eq!(network.remote("books").len(), 1);
        assert_eq!(network.remote("films").len(), 1);
        assert_eq!(client.pending_sync_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_collection_handles_share_cache() {
        let client = client(Arc::new(MockNetwork::new())).await;
        let sync = client.collection("books", DataStoreType::Sync).unwrap();
        let other = client.collection("books", DataStoreType::Sync).unwrap();

        sync.create(entity(json!({"title": "Dune"}))).await.unwrap();
        assert_eq!(other.find(None).await.unwrap().len(), 1);

        assert!(client.clear_cache().await.unwrap() >= 1);
        assert!(other.find(None).await.unwrap().is_empty());
        assert_eq!(client.pending_sync_count().await.unwrap(), 0);
    }
}
