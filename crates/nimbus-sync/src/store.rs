//! # Collection
//!
//! The public CRUD surface bound to one named collection.
//!
//! ## Store Modes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   DataStoreType   cache_enabled   online    reads            writes    │
//! │   ─────────────   ─────────────   ──────    ──────────────   ───────── │
//! │   Cache           yes             yes       cache, network   cache +   │
//! │                                                              push now  │
//! │   Sync            yes             no        cache            cache,    │
//! │                                                              push later│
//! │   Network         no              yes       network          network   │
//! │   (illegal)       no              no        ──► InvalidMode            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Read Path (`find_stream`)
//! ```text
//!   cache_enabled && online && pending > 0 ──► push ──► still pending?
//!                                                        └─► PendingSync
//!   cache_enabled ──► emit cache result
//!   online        ──► emit network result (delta fetch when enabled)
//!                     └─► cache_enabled: drop cached entities the network
//!                         no longer returns, save the network result
//! ```
//!
//! `push`, `pending_sync_count`, `pending_sync_entities` and `clear_sync`
//! take entity queries; they are re-rooted under each ledger row's `entity`
//! field before reaching the sync engine.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use nimbus_core::{entity_ids, Entity, PendingOperation, Query, ID_FIELD};
use nimbus_db::CacheStore;
use serde_json::Value;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use crate::delta::delta_fetch;
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::network::{Network, NetworkRequest};
use crate::queue::PushResult;

/// Ledger row field holding the queued entity.
const ENTITY_FIELD: &str = "entity";

/// Ledger row field holding the queued entity's id.
const ENTITY_ID_FIELD: &str = "entityId";

// =============================================================================
// Modes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataStoreType {
    /// Cache plus network; writes are pushed immediately.
    #[default]
    Cache,
    /// Cache only; writes wait for an explicit push.
    Sync,
    /// Network only.
    Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreMode {
    cache_enabled: bool,
    online: bool,
}

impl StoreMode {
    /// ## Errors
    /// `SyncError::InvalidMode` when neither the cache nor the network is used.
    pub fn new(cache_enabled: bool, online: bool) -> SyncResult<Self> {
        if !cache_enabled && !online {
            return Err(SyncError::InvalidMode(
                "a store must use the cache, the network or both".into(),
            ));
        }
        Ok(StoreMode {
            cache_enabled,
            online,
        })
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    pub fn online(&self) -> bool {
        self.online
    }
}

impl From<DataStoreType> for StoreMode {
    fn from(store_type: DataStoreType) -> Self {
        let (cache_enabled, online) = match store_type {
            DataStoreType::Cache => (true, true),
            DataStoreType::Sync => (true, false),
            DataStoreType::Network => (false, true),
        };
        StoreMode {
            cache_enabled,
            online,
        }
    }
}

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveResult {
    pub count: usize,
}

/// What `sync` did: the push results, then the pulled entities.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub push: Vec<PushResult>,
    pub pull: Vec<Entity>,
}

// =============================================================================
// Collection
// =============================================================================

/// Request settings shared by every collection of a client.
#[derive(Debug, Clone, Copy)]
pub struct CollectionOptions {
    pub timeout: Duration,
    pub delta_fetch: bool,
}

#[derive(Clone)]
pub struct Collection {
    name: String,
    mode: StoreMode,
    cache: CacheStore,
    engine: SyncEngine,
    network: Arc<dyn Network>,
    options: CollectionOptions,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Collection {
    pub fn new(
        mode: StoreMode,
        cache: CacheStore,
        engine: SyncEngine,
        network: Arc<dyn Network>,
        options: CollectionOptions,
    ) -> Self {
        Collection {
            name: cache.collection().to_string(),
            mode,
            cache,
            engine,
            network,
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    /// Switches the network on or off for later calls.
    pub fn set_online(&mut self, online: bool) -> SyncResult<()> {
        self.mode = StoreMode::new(self.mode.cache_enabled, online)?;
        Ok(())
    }

    /// Switches the cache on or off for later calls.
    pub fn set_cache_enabled(&mut self, cache_enabled: bool) -> SyncResult<()> {
        self.mode = StoreMode::new(cache_enabled, self.mode.online)?;
        Ok(())
    }

    pub fn set_delta_fetch(&mut self, enabled: bool) {
        self.options.delta_fetch = enabled;
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Entities matching `query`: the cache result first (when cached),
    /// then the network result (when online).
    ///
    /// ## Errors
    /// - `SyncError::PendingSync` if unsynced writes survive a push attempt
    /// - `SyncError::Parameter` for a query the cache cannot evaluate
    ///   offline in Sync mode
    pub fn find_stream(
        &self,
        query: Option<Query>,
    ) -> impl Stream<Item = SyncResult<Vec<Entity>>> + '_ {
        try_stream! {
            self.ensure_synced().await?;

            let use_cache = self.mode.cache_enabled && self.cache_can_evaluate(query.as_ref())?;
            let mut snapshot = Vec::new();
            if use_cache {
                snapshot = self.cache.find(query.as_ref()).await?;
                yield snapshot.clone();
            }

            if self.mode.online {
                let remote = self.fetch(query.as_ref(), snapshot.clone()).await?;
                if use_cache && reconcilable(query.as_ref()) {
                    self.reconcile(&snapshot, &remote).await?;
                }
                yield remote;
            }
        }
    }

    /// The most authoritative emission of [`find_stream`](Self::find_stream).
    pub async fn find(&self, query: Option<Query>) -> SyncResult<Vec<Entity>> {
        Ok(last_emission(self.find_stream(query)).await?.unwrap_or_default())
    }

    pub fn find_by_id_stream<'a>(
        &'a self,
        id: &'a str,
    ) -> impl Stream<Item = SyncResult<Option<Entity>>> + 'a {
        try_stream! {
            if id.is_empty() {
                Err::<(), _>(SyncError::Parameter("id must not be empty".into()))?;
            }
            self.ensure_synced().await?;

            if self.mode.cache_enabled {
                yield self.cache.find_by_id(id).await?;
            }

            if self.mode.online {
                let path = self.cache.pathname().with_id(id).to_string();
                let fetched = match self.request(NetworkRequest::get(path)).await {
                    Ok(data) => Some(Entity::from_value(data)?),
                    Err(e) if e.is_not_found() => None,
                    Err(e) => Err(e)?,
                };

                if self.mode.cache_enabled {
                    match &fetched {
                        Some(entity) => {
                            self.cache.save_one(entity.clone()).await?;
                        }
                        None => {
                            self.cache.remove_by_id(id).await?;
                        }
                    }
                }
                yield fetched;
            }
        }
    }

    pub async fn find_by_id(&self, id: &str) -> SyncResult<Option<Entity>> {
        Ok(last_emission(self.find_by_id_stream(id)).await?.flatten())
    }

    pub fn count_stream(&self, query: Option<Query>) -> impl Stream<Item = SyncResult<usize>> + '_ {
        try_stream! {
            self.ensure_synced().await?;

            if self.mode.cache_enabled && self.cache_can_evaluate(query.as_ref())? {
                yield self.cache.count(query.as_ref()).await?;
            }

            if self.mode.online {
                let path = format!("{}/_count", self.cache.pathname());
                let data = self.request(NetworkRequest::get(path).query(query.clone())).await?;
                let count = data
                    .get("count")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| SyncError::Server {
                        status: 200,
                        message: "count response has no count".into(),
                    })?;
                yield count as usize;
            }
        }
    }

    pub async fn count(&self, query: Option<Query>) -> SyncResult<usize> {
        Ok(last_emission(self.count_stream(query)).await?.unwrap_or(0))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub async fn create(&self, entity: Entity) -> SyncResult<Entity> {
        first(self.create_many(vec![entity]).await?)
    }

    /// Saves new entities to the cache, queues them and pushes them when
    /// online. Entities without `_id` get a local id.
    pub async fn create_many(&self, entities: Vec<Entity>) -> SyncResult<Vec<Entity>> {
        if !self.mode.cache_enabled {
            let path = self.cache.pathname().to_string();
            let mut created = Vec::with_capacity(entities.len());
            for entity in entities {
                let data = self.request(NetworkRequest::post(path.as_str(), entity.into_value())).await?;
                created.push(Entity::from_value(data)?);
            }
            return Ok(created);
        }

        let saved = self.cache.save(entities).await?;
        self.engine.add_create_operation(saved.clone()).await?;
        self.push_written(saved).await
    }

    pub async fn update(&self, entity: Entity) -> SyncResult<Entity> {
        first(self.update_many(vec![entity]).await?)
    }

    /// ## Errors
    /// `SyncError::Parameter` if any entity has no `_id`.
    pub async fn update_many(&self, entities: Vec<Entity>) -> SyncResult<Vec<Entity>> {
        if entities.iter().any(|e| e.id().is_none()) {
            return Err(SyncError::Parameter(format!(
                "cannot update an entity without an _id in {}",
                self.name
            )));
        }

        if !self.mode.cache_enabled {
            let mut updated = Vec::with_capacity(entities.len());
            for entity in entities {
                let path = self.cache.pathname().with_id(entity.id().unwrap_or_default()).to_string();
                let data = self.request(NetworkRequest::put(path, entity.into_value())).await?;
                updated.push(Entity::from_value(data)?);
            }
            return Ok(updated);
        }

        let mut entities = entities;
        for entity in entities.iter_mut().filter(|e| !e.is_local()) {
            let id = entity.id().unwrap_or_default().to_string();
            if self.cache.find_by_id(&id).await?.is_some_and(|cached| cached.is_local()) {
                entity.mark_local();
            }
        }

        let saved = self.cache.save(entities).await?;
        self.engine.add_update_operation(saved.clone()).await?;
        self.push_written(saved).await
    }

    /// Creates the entity if it has no `_id`, otherwise updates it.
    pub async fn save(&self, entity: Entity) -> SyncResult<Entity> {
        if entity.id().is_some() {
            self.update(entity).await
        } else {
            self.create(entity).await
        }
    }

    /// Pushes just-written entities when online, preferring the server
    /// copy for each one that pushed cleanly.
    async fn push_written(&self, saved: Vec<Entity>) -> SyncResult<Vec<Entity>> {
        if !self.mode.online {
            return Ok(saved);
        }

        let results = self.engine.push(Some(&entity_id_query(&saved))).await?;
        Ok(saved
            .into_iter()
            .map(|entity| {
                results
                    .iter()
                    .find(|r| r.is_success() && Some(r.id.as_str()) == entity.id())
                    .map(|r| r.entity.clone())
                    .unwrap_or(entity)
            })
            .collect())
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Removes matching entities. Returns how many left the cache (Cache
    /// and Sync modes) or the server (Network mode).
    pub async fn remove(&self, query: Option<Query>) -> SyncResult<RemoveResult> {
        if !self.mode.cache_enabled {
            let path = self.cache.pathname().to_string();
            let data = self.request(NetworkRequest::delete(path).query(query)).await?;
            return Ok(RemoveResult {
                count: response_count(&data),
            });
        }

        let removed = self.cache.remove(query.as_ref()).await?;
        self.record_removal(removed).await
    }

    /// Removes one entity.
    ///
    /// An id that is not cached still gets a DELETE queued: the entity may
    /// exist remotely. `count` only reports cache removals then.
    pub async fn remove_by_id(&self, id: &str) -> SyncResult<RemoveResult> {
        if id.is_empty() {
            return Err(SyncError::Parameter("id must not be empty".into()));
        }

        if !self.mode.cache_enabled {
            let path = self.cache.pathname().with_id(id).to_string();
            let data = self.request(NetworkRequest::delete(path)).await?;
            return Ok(RemoveResult {
                count: response_count(&data).max(1),
            });
        }

        match self.cache.remove_by_id(id).await? {
            Some(entity) => self.record_removal(vec![entity]).await,
            None => {
                let mut tombstone = Entity::new();
                tombstone.set_id(id);
                self.engine.add_delete_operation(vec![tombstone.clone()]).await?;
                if self.mode.online {
                    self.engine.push(Some(&entity_id_query(&[tombstone]))).await?;
                }
                Ok(RemoveResult { count: 0 })
            }
        }
    }

    /// Queues DELETEs for removed entities the server knows and forgets
    /// pending operations of entities it never saw.
    async fn record_removal(&self, removed: Vec<Entity>) -> SyncResult<RemoveResult> {
        let count = removed.len();
        let (local, remote): (Vec<Entity>, Vec<Entity>) =
            removed.into_iter().partition(Entity::is_local);

        if !local.is_empty() {
            self.engine.clear(Some(&entity_id_query(&local))).await?;
        }

        if !remote.is_empty() {
            let query = entity_id_query(&remote);
            self.engine.add_delete_operation(remote).await?;
            if self.mode.online {
                self.engine.push(Some(&query)).await?;
            }
        }

        debug!(collection = %self.name, count, "Removed entities");
        Ok(RemoveResult { count })
    }

    /// Drops matching entities from the cache and forgets their pending
    /// operations. Nothing is sent to the server.
    pub async fn clear(&self, query: Option<Query>) -> SyncResult<RemoveResult> {
        self.require_cache("clear")?;
        let removed = self.cache.remove(query.as_ref()).await?;
        if !removed.is_empty() {
            self.engine.clear(Some(&entity_id_query(&removed))).await?;
        }
        info!(collection = %self.name, count = removed.len(), "Cleared cached entities");
        Ok(RemoveResult {
            count: removed.len(),
        })
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Pushes pending operations whose entity matches `query`.
    pub async fn push(&self, query: Option<Query>) -> SyncResult<Vec<PushResult>> {
        self.require_cache("push")?;
        self.engine.push(nested(query).as_ref()).await
    }

    /// Fetches matching entities from the network into the cache.
    ///
    /// ## Errors
    /// `SyncError::PendingSync` while the collection has pending operations.
    pub async fn pull(&self, query: Option<Query>) -> SyncResult<Vec<Entity>> {
        self.require_cache("pull")?;

        let count = self.engine.count(None).await?;
        if count > 0 {
            return Err(SyncError::PendingSync {
                collection: self.name.clone(),
                count,
            });
        }

        let use_cache = query.as_ref().map_or(true, Query::is_supported_offline);
        let snapshot = if use_cache {
            self.cache.find(query.as_ref()).await?
        } else {
            Vec::new()
        };

        let remote = self.fetch(query.as_ref(), snapshot.clone()).await?;
        if use_cache && reconcilable(query.as_ref()) {
            self.reconcile(&snapshot, &remote).await?;
        } else if reconcilable(query.as_ref()) {
            self.cache.save(remote.clone()).await?;
        }

        info!(collection = %self.name, count = remote.len(), "Pulled entities");
        Ok(remote)
    }

    /// Pushes every pending operation of the collection, then pulls `query`.
    pub async fn sync(&self, query: Option<Query>) -> SyncResult<SyncSummary> {
        let push = self.push(None).await?;
        let pull = self.pull(query).await?;
        Ok(SyncSummary { push, pull })
    }

    pub async fn pending_sync_count(&self, query: Option<Query>) -> SyncResult<usize> {
        self.require_cache("pending_sync_count")?;
        self.engine.count(nested(query).as_ref()).await
    }

    pub async fn pending_sync_entities(
        &self,
        query: Option<Query>,
    ) -> SyncResult<Vec<PendingOperation>> {
        self.require_cache("pending_sync_entities")?;
        self.engine.entities(nested(query).as_ref()).await
    }

    /// Forgets pending operations without pushing them.
    pub async fn clear_sync(&self, query: Option<Query>) -> SyncResult<usize> {
        self.require_cache("clear_sync")?;
        self.engine.clear(nested(query).as_ref()).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Pushes once if writes are pending and refuses to continue if some
    /// remain. Only reads that reach the network are gated.
    async fn ensure_synced(&self) -> SyncResult<()> {
        if !(self.mode.cache_enabled && self.mode.online) {
            return Ok(());
        }

        let mut count = self.engine.count(None).await?;
        if count > 0 {
            debug!(collection = %self.name, count, "Pushing pending operations before read");
            self.engine.push(None).await?;
            count = self.engine.count(None).await?;
        }

        if count > 0 {
            return Err(SyncError::PendingSync {
                collection: self.name.clone(),
                count,
            });
        }
        Ok(())
    }

    /// Whether the cache step runs for `query`.
    ///
    /// Online stores skip the cache for server-only queries; offline stores
    /// have nowhere else to go and fail.
    fn cache_can_evaluate(&self, query: Option<&Query>) -> SyncResult<bool> {
        match query {
            Some(q) if !q.is_supported_offline() => {
                if self.mode.online {
                    Ok(false)
                } else {
                    q.ensure_supported_offline()?;
                    Ok(false)
                }
            }
            _ => Ok(true),
        }
    }

    async fn fetch(&self, query: Option<&Query>, snapshot: Vec<Entity>) -> SyncResult<Vec<Entity>> {
        if self.options.delta_fetch && self.mode.cache_enabled {
            return delta_fetch(
                self.network.as_ref(),
                self.options.timeout,
                self.cache.pathname(),
                query,
                snapshot,
            )
            .await;
        }

        let path = self.cache.pathname().to_string();
        let data = self.request(NetworkRequest::get(path).query(query.cloned())).await?;
        Ok(Entity::many_from_value(data)?)
    }

    /// Drops snapshot entities missing from `remote`, then saves `remote`.
    async fn reconcile(&self, snapshot: &[Entity], remote: &[Entity]) -> SyncResult<()> {
        let remote_ids: HashSet<&str> = remote.iter().filter_map(Entity::id).collect();
        let stale: Vec<String> = snapshot
            .iter()
            .filter_map(Entity::id)
            .filter(|id| !remote_ids.contains(id))
            .map(str::to_string)
            .collect();

        if !stale.is_empty() {
            debug!(collection = %self.name, count = stale.len(), "Removing entities deleted remotely");
            self.cache.remove(Some(&Query::new().contains(ID_FIELD, stale))).await?;
        }
        self.cache.save(remote.to_vec()).await?;
        Ok(())
    }

    async fn request(&self, request: NetworkRequest) -> SyncResult<Value> {
        request.execute(self.network.as_ref(), self.options.timeout).await
    }

    fn require_cache(&self, operation: &str) -> SyncResult<()> {
        if self.mode.cache_enabled {
            Ok(())
        } else {
            Err(SyncError::InvalidMode(format!(
                "{operation} is not available on a network-only store ({})",
                self.name
            )))
        }
    }
}

// =============================================================================
// Free Helpers
// =============================================================================

async fn last_emission<T>(stream: impl Stream<Item = SyncResult<T>>) -> SyncResult<Option<T>> {
    tokio::pin!(stream);
    let mut last = None;
    while let Some(item) = stream.next().await {
        last = Some(item?);
    }
    Ok(last)
}

fn first(entities: Vec<Entity>) -> SyncResult<Entity> {
    entities
        .into_iter()
        .next()
        .ok_or_else(|| SyncError::Internal("write returned no entity".into()))
}

/// Ledger query selecting the rows of the given entities.
fn entity_id_query(entities: &[Entity]) -> Query {
    Query::new().contains(ENTITY_ID_FIELD, entity_ids(entities))
}

fn nested(query: Option<Query>) -> Option<Query> {
    query.map(|q| q.nest_under(ENTITY_FIELD))
}

/// Projected results are partial entities and must not replace cached ones.
fn reconcilable(query: Option<&Query>) -> bool {
    query.map_or(true, |q| q.fields.is_empty())
}

fn response_count(data: &Value) -> usize {
    match data {
        Value::Array(items) => items.len(),
        other => other.get("count").and_then(Value::as_u64).unwrap_or(0) as usize,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::MockNetwork;
    use crate::queue::SyncQueue;
    use nimbus_db::{CacheRegistry, MemoryPersistence, Method};
    use serde_json::json;

    struct Fixture {
        stores: Arc<CacheRegistry>,
        network: Arc<MockNetwork>,
        queue: SyncQueue,
    }

    impl Fixture {
        fn new() -> Self {
            let stores = Arc::new(CacheRegistry::new(
                Arc::new(MemoryPersistence::new()),
                "appdata",
                "kid_app",
            ));
            let network = Arc::new(MockNetwork::new());
            let queue = SyncQueue::new(stores.clone(), network.clone(), 100, Duration::from_secs(5));
            Fixture {
                stores,
                network,
                queue,
            }
        }

        fn collection(&self, name: &str, store_type: DataStoreType) -> Collection {
            Collection::new(
                store_type.into(),
                self.stores.store(name),
                SyncEngine::new(name, self.queue.clone()),
                self.network.clone(),
                CollectionOptions {
                    timeout: Duration::from_secs(5),
                    delta_fetch: false,
                },
            )
        }
    }

    fn entity(value: Value) -> Entity {
        Entity::from_value(value).unwrap()
    }

    #[test]
    fn test_store_modes() {
        assert_eq!(StoreMode::from(DataStoreType::Cache), StoreMode::new(true, true).unwrap());
        assert!(!StoreMode::from(DataStoreType::Sync).online());
        assert!(!StoreMode::from(DataStoreType::Network).cache_enabled());
        assert!(matches!(StoreMode::new(false, false), Err(SyncError::InvalidMode(_))));
    }

    #[test]
    fn test_illegal_mode_toggle_is_rejected() {
        let f = Fixture::new();
        let mut books = f.collection("books", DataStoreType::Network);
        assert!(books.set_online(false).is_err());
        assert!(books.mode().online());
        books.set_cache_enabled(true).unwrap();
        books.set_online(false).unwrap();
        assert_eq!(books.mode(), StoreMode::from(DataStoreType::Sync));
    }

    #[tokio::test]
    async fn test_sync_mode_round_trip() {
        let f = Fixture::new();
        let books = f.collection("books", DataStoreType::Sync);

        let saved = books.save(entity(json!({"title": "Dune", "pages": 412}))).await.unwrap();
        assert!(saved.is_local());

        let found = books.find(None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("title"), Some(&json!("Dune")));
        assert_eq!(found[0].get("pages"), Some(&json!(412)));
        assert!(found[0].get("_kmd").is_some());

        assert_eq!(books.pending_sync_count(None).await.unwrap(), 1);
        assert!(f.network.requests().is_empty());
    }

    #[tokio::test]
    async fn test_offline_create_then_push_migrates_identity() {
        let f = Fixture::new();
        let books = f.collection("books", DataStoreType::Sync);

        let local = books.create(entity(json!({"title": "Dune"}))).await.unwrap();
        let local_id = local.id().unwrap().to_string();
        let updated = books
            .update(entity(json!({"_id": local_id.clone(), "title": "Dune II"})))
            .await
            .unwrap();
        assert!(updated.is_local());

        let results = books.push(None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_success());
        assert_eq!(results[0].id, local_id);

        let posts: Vec<_> = f.network.requests().into_iter().filter(|r| r.method == Method::Post).collect();
        assert_eq!(posts.len(), 1);
        assert!(f.network.requests().iter().all(|r| r.method != Method::Put));

        let cached = books.find(None).await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_ne!(cached[0].id(), Some(local_id.as_str()));
        assert_eq!(cached[0].get("title"), Some(&json!("Dune II")));
        assert!(books.find_by_id(&local_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_mode_create_returns_server_copy() {
        let f = Fixture::new();
        let books = f.collection("books", DataStoreType::Cache);

        let created = books.create(entity(json!({"title": "Emma"}))).await.unwrap();
        assert!(created.id().unwrap().starts_with("srv"));
        assert!(!created.is_local());
        assert_eq!(books.pending_sync_count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_mode_create_keeps_cache_copy_on_push_failure() {
        let f = Fixture::new();
        let books = f.collection("books", DataStoreType::Cache);
        f.network.fail(Method::Post, None, SyncError::Network("offline".into()));

        let created = books.create(entity(json!({"title": "Emma"}))).await.unwrap();
        assert!(created.is_local());
        assert_eq!(books.pending_sync_count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reads_blocked_while_writes_pending() {
        let f = Fixture::new();
        let books = f.collection("books", DataStoreType::Cache);
        f.network.fail(Method::Put, None, SyncError::Server { status: 500, message: "down".into() });
        books.save(entity(json!({"_id": "b1", "title": "Dune"}))).await.unwrap();

        let err = books.find(None).await.unwrap_err();
        assert!(err.to_string().contains("1 entities"));
        match err {
            SyncError::PendingSync { collection, count } => {
                assert_eq!(collection, "books");
                assert_eq!(count, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(books.count(None).await, Err(SyncError::PendingSync { .. })));

        f.network.clear_failures();
        let found = books.find(None).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_find_stream_emits_cache_then_network() {
        let f = Fixture::new();
        let books = f.collection("books", DataStoreType::Cache);
        f.stores.store("books").save(vec![
            entity(json!({"_id": "a", "title": "Old"})),
            entity(json!({"_id": "gone", "title": "Deleted remotely"})),
        ]).await.unwrap();
        f.network.seed("books", vec![json!({"_id": "a", "title": "New"}), json!({"_id": "b", "title": "B"})]);

        let emissions: Vec<Vec<Entity>> = books
            .find_stream(None)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<SyncResult<_>>()
            .unwrap();
        assert_eq!(emissions.len(), 2);
        assert_eq!(emissions[0].len(), 2);
        assert_eq!(emissions[1].len(), 2);

        let cache = f.stores.store("books");
        assert!(cache.find_by_id("gone").await.unwrap().is_none());
        let a = cache.find_by_id("a").await.unwrap().unwrap();
        assert_eq!(a.get("title"), Some(&json!("New")));
        assert_eq!(cache.count(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_find_by_id_and_count() {
        let f = Fixture::new();
        let books = f.collection("books", DataStoreType::Cache);
        f.network.seed("books", vec![json!({"_id": "a", "n": 1}), json!({"_id": "b", "n": 2})]);
        f.stores.store("books").save_one(entity(json!({"_id": "x"}))).await.unwrap();

        let a = books.find_by_id("a").await.unwrap().unwrap();
        assert_eq!(a.get("n"), Some(&json!(1)));
        assert!(f.stores.store("books").find_by_id("a").await.unwrap().is_some());

        assert!(books.find_by_id("x").await.unwrap().is_none());
        assert!(f.stores.store("books").find_by_id("x").await.unwrap().is_none());

        assert_eq!(books.count(Some(Query::new().greater_than("n", 1))).await.unwrap(), 1);
        let last = f.network.requests().pop().unwrap();
        assert_eq!(last.path, "/appdata/kid_app/books/_count");
    }

    #[tokio::test]
    async fn test_remove_local_and_remote_entities() {
        let f = Fixture::new();
        let books = f.collection("books", DataStoreType::Sync);
        books.create(entity(json!({"title": "Local"}))).await.unwrap();
        f.stores.store("books").save_one(entity(json!({"_id": "srv1", "title": "Remote"}))).await.unwrap();

        let removed = books.remove(None).await.unwrap();
        assert_eq!(removed.count, 2);

        let pending = books.pending_sync_entities(None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity_id, "srv1");
        assert_eq!(pending[0].method(), nimbus_core::SyncMethod::Delete);
    }

    #[tokio::test]
    async fn test_remove_by_id_uncached_still_queues_delete() {
        let f = Fixture::new();
        let books = f.collection("books", DataStoreType::Sync);
        let result = books.remove_by_id("elsewhere").await.unwrap();
        assert_eq!(result.count, 0);
        assert_eq!(books.pending_sync_count(None).await.unwrap(), 1);

        let results = books.push(None).await.unwrap();
        assert!(results[0].is_success());
    }

    #[tokio::test]
    async fn test_pull_and_sync() {
        let f = Fixture::new();
        let books = f.collection("books", DataStoreType::Sync);
        f.network.seed("books", vec![json!({"_id": "a", "title": "A"})]);

        books.save(entity(json!({"_id": "b", "title": "B"}))).await.unwrap();
        let err = books.pull(None).await.unwrap_err();
        assert!(matches!(err, SyncError::PendingSync { count: 1, .. }));

        let summary = books.sync(None).await.unwrap();
        assert_eq!(summary.push.len(), 1);
        assert_eq!(summary.pull.len(), 2);
        assert_eq!(books.find(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_pending_queries_are_entity_queries() {
        let f = Fixture::new();
        let books = f.collection("books", DataStoreType::Sync);
        books.save(entity(json!({"_id": "a", "genre": "scifi"}))).await.unwrap();
        books.save(entity(json!({"_id": "b", "genre": "drama"}))).await.unwrap();
        books.save(entity(json!({"_id": "a", "genre": "scifi"}))).await.unwrap();

        // Paging does not apply to ledger rows.
        assert_eq!(books.pending_sync_count(Some(Query::new().limit(1))).await.unwrap(), 2);

        let scifi = Query::new().equal_to("genre", "scifi");
        assert_eq!(books.pending_sync_count(Some(scifi.clone())).await.unwrap(), 1);
        assert_eq!(books.clear_sync(Some(scifi)).await.unwrap(), 2);
        assert_eq!(books.pending_sync_count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_forgets_entities_and_operations() {
        let f = Fixture::new();
        let books = f.collection("books", DataStoreType::Sync);
        books.save(entity(json!({"_id": "a"}))).await.unwrap();
        books.create(entity(json!({"title": "local"}))).await.unwrap();

        assert_eq!(books.clear(None).await.unwrap().count, 2);
        assert_eq!(books.pending_sync_count(None).await.unwrap(), 0);
        assert!(books.find(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_network_mode() {
        let f = Fixture::new();
        let books = f.collection("books", DataStoreType::Network);

        let created = books.save(entity(json!({"title": "Net"}))).await.unwrap();
        let id = created.id().unwrap().to_string();
        assert_eq!(books.find(None).await.unwrap().len(), 1);
        assert_eq!(f.stores.store("books").count(None).await.unwrap(), 0);

        assert!(matches!(books.push(None).await, Err(SyncError::InvalidMode(_))));
        assert!(matches!(books.pull(None).await, Err(SyncError::InvalidMode(_))));

        assert_eq!(books.remove_by_id(&id).await.unwrap().count, 1);
        assert!(f.network.remote("books").is_empty());
    }

    #[tokio::test]
    async fn test_update_without_id_is_parameter_error() {
        let f = Fixture::new();
        let books = f.collection("books", DataStoreType::Sync);
        let err = books.update(entity(json!({"title": "x"}))).await.unwrap_err();
        assert!(matches!(err, SyncError::Parameter(_)));
    }

    #[tokio::test]
    async fn test_server_only_query() {
        let f = Fixture::new();
        let near = Query::new().near("loc", 1.0, 2.0);

        let offline = f.collection("places", DataStoreType::Sync);
        assert!(matches!(offline.find(Some(near.clone())).await, Err(SyncError::Parameter(_))));

        let online = f.collection("places", DataStoreType::Cache);
        let emissions = online.find_stream(Some(near)).collect::<Vec<_>>().await;
        // no cache emission; the single emission is the network's answer
        assert_eq!(emissions.len(), 1);
        let requests = f.network.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].query.as_ref().is_some_and(|q| !q.is_supported_offline()));
    }
}
