//! # Sync Queue
//!
//! The pending operation ledger shared by every collection of a client,
//! and the push algorithm that drains it.
//!
//! ## Ledger Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    _nimbus_sync (ledger collection)                     │
//! │                                                                         │
//! │  _id | key | collection | state.method | entityId | entity             │
//! │  ────┼─────┼────────────┼──────────────┼──────────┼─────────           │
//! │  "5" │ 5   │ books      │ PUT          │ b1       │ {...}              │
//! │  "6" │ 6   │ books      │ DELETE       │ b2       │ {...}              │
//! │  "7" │ 7   │ books      │ PUT          │ b1       │ {...}  ◄── wins    │
//! │                                                                         │
//! │  _nimbus_sync_key: { _id: "key", value: 7 }   (persisted counter)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Push Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. Take:   read-and-delete matching rows (one ledger permit)          │
//! │  2. Dedup:  sort by key desc, keep the first row per entity id         │
//! │  3. Batch:  push_batch_size rows at a time, batches in sequence,       │
//! │             rows of a batch concurrently                               │
//! │  4. Apply:  DELETE ──► remote delete (NotFound counts as done)         │
//! │             POST/PUT ──► local entity: strip id, POST, swap ids        │
//! │                          otherwise:    PUT by id / POST              │
//! │  5. Triage: NotFound                 ──► dropped, error reported       │
//! │             InsufficientCredentials  ──► cache repaired, dropped       │
//! │             anything else            ──► re-queued under its key       │
//! │  6. Return: one PushResult per row, in batch order                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Counter
//! Keys come from a counter persisted next to the ledger and updated under
//! the counter store's work queue. One process must be the only writer of
//! a given ledger: two clients over the same storage would hand out the
//! same keys.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use nimbus_core::{
    dedup_latest, CoreResult, Entity, PendingOperation, Query, SyncMethod, SYNC_COLLECTION,
    SYNC_KEY_COLLECTION,
};
use nimbus_db::{CacheRegistry, CacheStore, DbError};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::network::{Network, NetworkRequest};

// =============================================================================
// Constants
// =============================================================================

/// Id of the counter document in the key collection.
const KEY_DOCUMENT_ID: &str = "key";

/// Field of the counter document holding the last issued key.
const KEY_FIELD: &str = "value";

// =============================================================================
// Push Result
// =============================================================================

/// Outcome of pushing one pending operation.
#[derive(Debug, Clone)]
pub struct PushResult {
    /// Entity id the operation was queued under (the local id for
    /// entities created offline).
    pub id: String,

    /// Server copy on success, otherwise the queued snapshot.
    pub entity: Entity,

    pub error: Option<SyncError>,
}

impl PushResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A push result plus the row to re-queue, if any.
struct PushOutcome {
    result: PushResult,
    retry: Option<PendingOperation>,
}

impl PushOutcome {
    fn done(id: String, entity: Entity) -> Self {
        PushOutcome {
            result: PushResult {
                id,
                entity,
                error: None,
            },
            retry: None,
        }
    }

    fn failed(row: &PendingOperation, error: SyncError, retry: bool) -> Self {
        PushOutcome {
            result: PushResult {
                id: row.entity_id.clone(),
                entity: row.entity.clone(),
                error: Some(error),
            },
            retry: retry.then(|| row.clone()),
        }
    }
}

// =============================================================================
// Sync Queue
// =============================================================================

/// Ordered ledger of pending operations for one app.
#[derive(Clone)]
pub struct SyncQueue {
    ledger: CacheStore,
    counter: CacheStore,
    stores: Arc<CacheRegistry>,
    network: Arc<dyn Network>,
    batch_size: usize,
    timeout: Duration,
}

impl std::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("ledger", &self.ledger)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl SyncQueue {
    /// Creates the queue over the app's ledger collections.
    ///
    /// ## Arguments
    /// * `stores` - Cache stores of the app; the ledger lives among them
    /// * `network` - Remote service pending operations are pushed to
    /// * `batch_size` - Rows pushed concurrently per batch (at least 1)
    /// * `timeout` - Default timeout of each push request
    pub fn new(
        stores: Arc<CacheRegistry>,
        network: Arc<dyn Network>,
        batch_size: usize,
        timeout: Duration,
    ) -> Self {
        SyncQueue {
            ledger: stores.store(SYNC_COLLECTION),
            counter: stores.store(SYNC_KEY_COLLECTION),
            stores,
            network,
            batch_size: batch_size.max(1),
            timeout,
        }
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Number of entities with a pending operation matching the ledger query.
    pub async fn count(&self, query: Option<&Query>) -> SyncResult<usize> {
        Ok(self.entities(query).await?.len())
    }

    /// Effective pending operations (latest per entity), newest first.
    pub async fn entities(&self, query: Option<&Query>) -> SyncResult<Vec<PendingOperation>> {
        let rows = self.read_rows(query).await?;
        Ok(dedup_latest(rows))
    }

    // -------------------------------------------------------------------------
    // Enqueue
    // -------------------------------------------------------------------------

    pub async fn add_create_operation(
        &self,
        collection: &str,
        entities: Vec<Entity>,
    ) -> SyncResult<Vec<Entity>> {
        self.add_operation(SyncMethod::Create, collection, entities).await
    }

    pub async fn add_update_operation(
        &self,
        collection: &str,
        entities: Vec<Entity>,
    ) -> SyncResult<Vec<Entity>> {
        self.add_operation(SyncMethod::Update, collection, entities).await
    }

    pub async fn add_delete_operation(
        &self,
        collection: &str,
        entities: Vec<Entity>,
    ) -> SyncResult<Vec<Entity>> {
        self.add_operation(SyncMethod::Delete, collection, entities).await
    }

    /// Appends one row per entity, keys in entity order.
    ///
    /// ## Errors
    /// `SyncError::Sync` if an entity has no `_id`; nothing is written then.
    async fn add_operation(
        &self,
        method: SyncMethod,
        collection: &str,
        entities: Vec<Entity>,
    ) -> SyncResult<Vec<Entity>> {
        if entities.is_empty() {
            return Ok(entities);
        }
        if entities.iter().any(|entity| entity.id().is_none()) {
            return Err(SyncError::Sync(format!(
                "an entity queued for {method} on {collection} has no _id"
            )));
        }

        let first_key = self.reserve_keys(entities.len() as u64).await?;
        let docs = entities
            .iter()
            .zip(first_key..)
            .map(|(entity, key)| {
                PendingOperation::new(key, collection, method, entity.clone())?.to_document()
            })
            .collect::<CoreResult<Vec<_>>>()?;

        self.ledger.save(docs).await?;

        debug!(
            %method,
            collection,
            count = entities.len(),
            first_key,
            "Queued pending operations"
        );
        Ok(entities)
    }

    /// Advances the persisted counter by `count` and returns the first
    /// key of the reserved range.
    async fn reserve_keys(&self, count: u64) -> SyncResult<u64> {
        let mut first = 0;
        self.counter
            .update_by_id(KEY_DOCUMENT_ID, |current| {
                let last = current
                    .as_ref()
                    .and_then(|doc| doc.get(KEY_FIELD))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                first = last + 1;

                let mut next = current.unwrap_or_default();
                next.insert(KEY_FIELD, last + count);
                Ok::<_, DbError>(next)
            })
            .await?;
        Ok(first)
    }

    // -------------------------------------------------------------------------
    // Clear
    // -------------------------------------------------------------------------

    /// Deletes matching rows without pushing them. Returns the number removed.
    pub async fn clear(&self, query: Option<&Query>) -> SyncResult<usize> {
        let removed = self.ledger.remove(query).await?;
        info!(count = removed.len(), "Cleared pending operations");
        Ok(removed.len())
    }

    // -------------------------------------------------------------------------
    // Push
    // -------------------------------------------------------------------------

    /// Applies matching pending operations to the remote service.
    ///
    /// Per-row failures are reported in the results; only setup failures
    /// (bad query, storage errors) return `Err`.
    pub async fn push(&self, query: Option<&Query>) -> SyncResult<Vec<PushResult>> {
        let taken = self.ledger.remove(query).await?;
        let rows = dedup_latest(parse_rows(taken));
        if rows.is_empty() {
            debug!("No pending operations to push");
            return Ok(Vec::new());
        }

        info!(count = rows.len(), batch_size = self.batch_size, "Pushing pending operations");

        let mut results = Vec::with_capacity(rows.len());
        let mut retry = Vec::new();

        for batch in rows.chunks(self.batch_size) {
            debug!(size = batch.len(), "Processing push batch");
            let outcomes = join_all(batch.iter().map(|row| self.push_operation(row))).await;

            for outcome in outcomes {
                retry.extend(outcome.retry);
                results.push(outcome.result);
            }
        }

        if !retry.is_empty() {
            let docs = retry
                .iter()
                .map(PendingOperation::to_document)
                .collect::<CoreResult<Vec<_>>>()?;
            self.ledger.save(docs).await?;
            warn!(count = retry.len(), "Re-queued pending operations after push failures");
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(pushed = results.len() - failed, failed, "Push complete");
        Ok(results)
    }

    async fn push_operation(&self, row: &PendingOperation) -> PushOutcome {
        match row.method() {
            SyncMethod::Delete => self.push_delete(row).await,
            SyncMethod::Create | SyncMethod::Update => self.push_save(row).await,
        }
    }

    async fn push_delete(&self, row: &PendingOperation) -> PushOutcome {
        let store = self.stores.store(&row.collection);
        let path = store.pathname().with_id(row.entity_id.as_str()).to_string();

        match NetworkRequest::delete(path)
            .execute(self.network.as_ref(), self.timeout)
            .await
        {
            Ok(_) => PushOutcome::done(row.entity_id.clone(), row.entity.clone()),
            Err(e) if e.is_not_found() => {
                debug!(id = %row.entity_id, "Entity already gone remotely");
                PushOutcome::done(row.entity_id.clone(), row.entity.clone())
            }
            Err(e) => self.triage(row, e).await,
        }
    }

    async fn push_save(&self, row: &PendingOperation) -> PushOutcome {
        let store = self.stores.store(&row.collection);
        let mut entity = row.entity.clone();
        let local = entity.is_local();

        let request = if local {
            entity.remove_id();
            entity.clear_local();
            NetworkRequest::post(store.pathname().to_string(), entity.into_value())
        } else {
            match row.method() {
                SyncMethod::Update => NetworkRequest::put(
                    store.pathname().with_id(row.entity_id.as_str()).to_string(),
                    entity.into_value(),
                ),
                _ => NetworkRequest::post(store.pathname().to_string(), entity.into_value()),
            }
        };

        let response = match request.execute(self.network.as_ref(), self.timeout).await {
            Ok(response) => response,
            Err(e) => return self.triage(row, e).await,
        };

        // The server has the change from here on; cache failures are not retried.
        match self.store_server_copy(&store, row, local, response).await {
            Ok(saved) => PushOutcome::done(row.entity_id.clone(), saved),
            Err(e) => {
                error!(id = %row.entity_id, error = %e, "Pushed entity could not be cached");
                PushOutcome::failed(row, e, false)
            }
        }
    }

    async fn store_server_copy(
        &self,
        store: &CacheStore,
        row: &PendingOperation,
        local: bool,
        response: Value,
    ) -> SyncResult<Entity> {
        let server = Entity::from_value(response)?;
        let saved = store.save_one(server).await?;

        if local && saved.id() != Some(row.entity_id.as_str()) {
            store.remove_by_id(&row.entity_id).await?;
            debug!(local_id = %row.entity_id, id = ?saved.id(), "Replaced local id with server id");
        }
        Ok(saved)
    }

    /// Classifies a failed row.
    async fn triage(&self, row: &PendingOperation, error: SyncError) -> PushOutcome {
        if error.is_not_found() {
            warn!(id = %row.entity_id, method = %row.method(), "Entity not found remotely, dropping operation");
            return PushOutcome::failed(row, error, false);
        }

        if error.is_insufficient_credentials() {
            warn!(id = %row.entity_id, method = %row.method(), "Insufficient credentials, dropping operation");
            if !row.entity.is_local() {
                self.repair(row).await;
            }
            return PushOutcome::failed(row, error, false);
        }

        warn!(id = %row.entity_id, method = %row.method(), error = %error, "Push failed, will retry");
        PushOutcome::failed(row, error, true)
    }

    /// Overwrites the cached entity with the server copy.
    async fn repair(&self, row: &PendingOperation) {
        let store = self.stores.store(&row.collection);
        let path = store.pathname().with_id(row.entity_id.as_str()).to_string();

        let result = async {
            let response = NetworkRequest::get(path)
                .execute(self.network.as_ref(), self.timeout)
                .await?;
            store.save_one(Entity::from_value(response)?).await?;
            Ok::<_, SyncError>(())
        }
        .await;

        match result {
            Ok(()) => debug!(id = %row.entity_id, "Restored cached entity from server"),
            Err(e) => warn!(id = %row.entity_id, error = %e, "Failed to restore cached entity"),
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    async fn read_rows(&self, query: Option<&Query>) -> SyncResult<Vec<PendingOperation>> {
        let docs = self.ledger.find(query).await?;
        Ok(parse_rows(docs))
    }
}

/// Parses ledger documents, dropping (and logging) unreadable ones.
fn parse_rows(docs: Vec<Entity>) -> Vec<PendingOperation> {
    docs.into_iter()
        .filter_map(|doc| {
            let doc_id = doc.id().map(str::to_string);
            match PendingOperation::from_document(doc) {
                Ok(row) => Some(row),
                Err(e) => {
                    error!(?doc_id, error = %e, "Discarding unreadable pending operation");
                    None
                }
            }
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::MockNetwork;
    use nimbus_db::{MemoryPersistence, Method};
    use serde_json::json;

    struct Fixture {
        stores: Arc<CacheRegistry>,
        network: Arc<MockNetwork>,
        queue: SyncQueue,
    }

    fn fixture(batch_size: usize) -> Fixture {
        let stores = Arc::new(CacheRegistry::new(
            Arc::new(MemoryPersistence::new()),
            "appdata",
            "kid_app",
        ));
        let network = Arc::new(MockNetwork::new());
        let queue = SyncQueue::new(
            stores.clone(),
            network.clone(),
            batch_size,
            Duration::from_secs(5),
        );
        Fixture {
            stores,
            network,
            queue,
        }
    }

    fn entity(value: Value) -> Entity {
        Entity::from_value(value).unwrap()
    }

    fn by_collection(name: &str) -> Query {
        Query::new().equal_to("collection", name)
    }

    #[tokio::test]
    async fn test_keys_increase_across_calls() {
        let f = fixture(100);
        f.queue
            .add_create_operation("books", vec![entity(json!({"_id": "a"})), entity(json!({"_id": "b"}))])
            .await
            .unwrap();
        f.queue
            .add_update_operation("books", vec![entity(json!({"_id": "c"}))])
            .await
            .unwrap();

        let mut keys: Vec<u64> = f.queue.entities(None).await.unwrap().iter().map(|r| r.key).collect();
        keys.sort();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_enqueue_without_id_fails() {
        let f = fixture(100);
        let err = f
            .queue
            .add_update_operation("books", vec![entity(json!({"_id": "a"})), entity(json!({"title": "x"}))])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Sync(_)));
        assert_eq!(f.queue.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_dedups_by_entity() {
        let f = fixture(100);
        let e = entity(json!({"_id": "b1", "n": 1}));
        f.queue.add_update_operation("books", vec![e.clone()]).await.unwrap();
        f.queue.add_update_operation("books", vec![e.clone()]).await.unwrap();
        f.queue.add_update_operation("films", vec![entity(json!({"_id": "f1"}))]).await.unwrap();

        assert_eq!(f.queue.count(None).await.unwrap(), 2);
        assert_eq!(f.queue.count(Some(&by_collection("books"))).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_latest_operation_wins() {
        let f = fixture(100);
        let books = f.stores.store("books");
        books.save_one(entity(json!({"_id": "b1", "v": 2}))).await.unwrap();

        // keys 5 and 7 for the same entity, 6 for another
        f.queue.reserve_keys(4).await.unwrap();
        f.queue.add_update_operation("books", vec![entity(json!({"_id": "b1", "v": 1}))]).await.unwrap();
        f.queue.add_update_operation("books", vec![entity(json!({"_id": "b9"}))]).await.unwrap();
        f.queue.add_update_operation("books", vec![entity(json!({"_id": "b1", "v": 2}))]).await.unwrap();

        let pending = f.queue.entities(Some(&by_collection("books"))).await.unwrap();
        assert_eq!(pending.iter().map(|r| r.key).collect::<Vec<_>>(), vec![7, 6]);

        f.network.fail(Method::Put, Some("b9"), SyncError::Network("reset".into()));
        let results = f.queue.push(None).await.unwrap();
        assert_eq!(results.len(), 2);

        let puts: Vec<_> = f
            .network
            .requests()
            .into_iter()
            .filter(|r| r.method == Method::Put && r.path.ends_with("/b1"))
            .collect();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].body.as_ref().unwrap()["v"], 2);

        assert_eq!(f.network.remote("books")[0].get("v"), Some(&json!(2)));
        assert_eq!(f.queue.count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_local_entity_gets_server_id() {
        let f = fixture(100);
        let books = f.stores.store("books");
        let mut local = entity(json!({"_id": "local1", "title": "Dune"}));
        local.mark_local();
        books.save_one(local.clone()).await.unwrap();
        f.queue.add_create_operation("books", vec![local]).await.unwrap();

        let results = f.queue.push(None).await.unwrap();
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert!(result.is_success());
        assert_eq!(result.id, "local1");
        let server_id = result.entity.id().unwrap().to_string();
        assert!(server_id.starts_with("srv"));
        assert!(!result.entity.is_local());

        let post = &f.network.requests()[0];
        assert_eq!(post.method, Method::Post);
        assert_eq!(post.path, "/appdata/kid_app/books");
        let body = post.body.as_ref().unwrap();
        assert!(body.get("_id").is_none());
        assert!(body["_kmd"].get("local").is_none());

        assert!(books.find_by_id("local1").await.unwrap().is_none());
        assert!(books.find_by_id(&server_id).await.unwrap().is_some());
        assert_eq!(f.queue.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_not_found_is_success() {
        let f = fixture(100);
        f.queue
            .add_delete_operation("books", vec![entity(json!({"_id": "gone"}))])
            .await
            .unwrap();

        let results = f.queue.push(None).await.unwrap();
        assert!(results[0].is_success());
        assert_eq!(f.queue.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_push_isolates_failures() {
        let f = fixture(2);
        let rows: Vec<Entity> = (1..=5).map(|i| entity(json!({"_id": format!("b{i}"), "n": i}))).collect();
        f.queue.add_update_operation("books", rows).await.unwrap();

        f.network.fail(Method::Put, Some("b2"), SyncError::Server { status: 503, message: "busy".into() });
        f.network.fail(Method::Put, Some("b4"), SyncError::NotFound("b4".into()));

        let results = f.queue.push(None).await.unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results.iter().filter(|r| r.is_success()).count(), 3);

        let remaining = f.queue.entities(None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].entity_id, "b2");
        assert_eq!(remaining[0].key, 2);

        f.network.clear_failures();
        let results = f.queue.push(None).await.unwrap();
        assert!(results.iter().all(PushResult::is_success));
        assert_eq!(f.queue.count(None).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_run_one_after_another() {
        let f = fixture(2);
        let rows: Vec<Entity> = (1..=5).map(|i| entity(json!({"_id": format!("b{i}")}))).collect();
        f.queue.add_update_operation("books", rows).await.unwrap();
        f.network.set_delay(Duration::from_millis(50));

        let results = f.queue.push(None).await.unwrap();
        assert_eq!(results.len(), 5);

        // Rows of a batch overlap; the next batch starts with nothing in flight.
        assert_eq!(f.network.concurrency(), vec![0, 1, 0, 1, 0]);
    }

    #[tokio::test]
    async fn test_insufficient_credentials_repairs_cache() {
        let f = fixture(100);
        let books = f.stores.store("books");
        f.network.seed("books", vec![json!({"_id": "b1", "title": "Server"})]);
        books.save_one(entity(json!({"_id": "b1", "title": "Local"}))).await.unwrap();
        f.queue
            .add_update_operation("books", vec![entity(json!({"_id": "b1", "title": "Local"}))])
            .await
            .unwrap();
        f.network.fail(Method::Put, Some("b1"), SyncError::InsufficientCredentials("denied".into()));

        let results = f.queue.push(None).await.unwrap();
        assert!(results[0].error.as_ref().unwrap().is_insufficient_credentials());
        assert_eq!(f.queue.count(None).await.unwrap(), 0);

        let cached = books.find_by_id("b1").await.unwrap().unwrap();
        assert_eq!(cached.get("title"), Some(&json!("Server")));
    }

    #[tokio::test]
    async fn test_scoped_push_and_clear() {
        let f = fixture(100);
        f.queue.add_update_operation("books", vec![entity(json!({"_id": "b1"}))]).await.unwrap();
        f.queue.add_update_operation("films", vec![entity(json!({"_id": "f1"}))]).await.unwrap();

        let results = f.queue.push(Some(&by_collection("books"))).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(f.queue.count(None).await.unwrap(), 1);

        assert_eq!(f.queue.clear(Some(&by_collection("films"))).await.unwrap(), 1);
        assert_eq!(f.queue.count(None).await.unwrap(), 0);
        assert!(f.queue.push(None).await.unwrap().is_empty());
    }
}
