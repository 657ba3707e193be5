//! # Local Cache Store
//!
//! CRUD over the entities of one collection. Not sync-aware: recording
//! pending operations is the sync queue's job.
//!
//! ## Work Queue
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   find ──┐                                                              │
//! │   save ──┼──► [ Mutex<()> : one permit ] ──► LocalRequest ──► backend   │
//! │   remove ┘         (per store instance)                                 │
//! │                                                                         │
//! │   Operations run one at a time, in arrival order, so a read issued      │
//! │   after a write always observes it. Read-modify-write helpers           │
//! │   (`remove`, `update_by_id`) hold the permit for their whole body.      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Local Ids
//! `save` gives every entity without `_id` a generated id and marks it
//! `_kmd.local = true` until the server assigns a real one.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use nimbus_core::{generate_local_id, Entity, Query};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::persistence::Persistence;
use crate::request::{LocalRequest, Pathname};

/// Cache of one collection.
///
/// Cloning shares the work queue.
#[derive(Clone)]
pub struct CacheStore {
    pathname: Pathname,
    persistence: Arc<dyn Persistence>,
    queue: Arc<Mutex<()>>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("pathname", &self.pathname)
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Creates a store for `/{namespace}/{app_key}/{collection}`.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        namespace: impl Into<String>,
        app_key: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        CacheStore {
            pathname: Pathname::collection(namespace, app_key, collection),
            persistence,
            queue: Arc::new(Mutex::new(())),
        }
    }

    pub fn collection(&self) -> &str {
        &self.pathname.collection
    }

    pub fn pathname(&self) -> &Pathname {
        &self.pathname
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Entities matching the query (all entities when `None`).
    ///
    /// ## Errors
    /// `DbError::InvalidQuery` if the query can't be evaluated offline.
    pub async fn find(&self, query: Option<&Query>) -> DbResult<Vec<Entity>> {
        validate(query)?;
        let _permit = self.queue.lock().await;
        self.find_unqueued(query).await
    }

    /// The entity with the given id, or `None`.
    pub async fn find_by_id(&self, id: &str) -> DbResult<Option<Entity>> {
        let _permit = self.queue.lock().await;
        self.find_by_id_unqueued(id).await
    }

    pub async fn count(&self, query: Option<&Query>) -> DbResult<usize> {
        Ok(self.find(query).await?.len())
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Inserts or replaces entities, assigning local ids where missing.
    pub async fn save(&self, entities: Vec<Entity>) -> DbResult<Vec<Entity>> {
        let entities = entities.into_iter().map(assign_local_id).collect::<Vec<_>>();
        if entities.is_empty() {
            return Ok(entities);
        }

        let _permit = self.queue.lock().await;
        self.save_unqueued(entities).await
    }

    pub async fn save_one(&self, entity: Entity) -> DbResult<Entity> {
        self.save(vec![entity])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Internal("save returned no entity".to_string()))
    }

    /// Removes one entity, returning it if it was cached.
    pub async fn remove_by_id(&self, id: &str) -> DbResult<Option<Entity>> {
        let _permit = self.queue.lock().await;
        let removed = self
            .execute(LocalRequest::delete(self.pathname.with_id(id)))
            .await?;
        Ok(Entity::many_from_value(removed)?.into_iter().next())
    }

    /// Removes every entity matching the query and returns them.
    ///
    /// Read and delete happen under one permit, so rows returned here are
    /// exactly the rows removed.
    pub async fn remove(&self, query: Option<&Query>) -> DbResult<Vec<Entity>> {
        validate(query)?;
        let _permit = self.queue.lock().await;
        let removed = self
            .execute(LocalRequest::delete(self.pathname.clone()).query(query.cloned()))
            .await?;
        let removed = Entity::many_from_value(removed)?;

        debug!(collection = %self.collection(), count = removed.len(), "Removed cached entities");
        Ok(removed)
    }

    /// Removes every entity of the collection.
    pub async fn clear(&self) -> DbResult<u64> {
        let _permit = self.queue.lock().await;
        let removed = self
            .persistence
            .clear(&self.pathname.app_key, Some(&self.pathname.collection))
            .await?;

        debug!(collection = %self.collection(), count = removed, "Cleared collection cache");
        Ok(removed)
    }

    /// Read-modify-write of one entity under a single permit.
    ///
    /// `f` receives the current entity (if any) and returns the entity to
    /// store under `id`.
    pub async fn update_by_id<F>(&self, id: &str, f: F) -> DbResult<Entity>
    where
        F: FnOnce(Option<Entity>) -> DbResult<Entity> + Send,
    {
        let _permit = self.queue.lock().await;
        let current = self.find_by_id_unqueued(id).await?;
        let mut next = f(current)?;
        next.set_id(id);

        let saved = self.save_unqueued(vec![next]).await?;
        saved
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Internal("save returned no entity".to_string()))
    }

    // -------------------------------------------------------------------------
    // Unqueued helpers (caller holds the permit)
    // -------------------------------------------------------------------------

    async fn find_unqueued(&self, query: Option<&Query>) -> DbResult<Vec<Entity>> {
        let data = self
            .execute(LocalRequest::get(self.pathname.clone()).query(query.cloned()))
            .await?;
        Ok(Entity::many_from_value(data)?)
    }

    async fn find_by_id_unqueued(&self, id: &str) -> DbResult<Option<Entity>> {
        match self.execute(LocalRequest::get(self.pathname.with_id(id))).await {
            Ok(data) => Ok(Some(Entity::from_value(data)?)),
            Err(DbError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn save_unqueued(&self, entities: Vec<Entity>) -> DbResult<Vec<Entity>> {
        let body = Value::Array(entities.into_iter().map(Entity::into_value).collect());
        let saved = self
            .execute(LocalRequest::post(self.pathname.clone(), body))
            .await?;
        Ok(Entity::many_from_value(saved)?)
    }

    async fn execute(&self, request: LocalRequest) -> DbResult<Value> {
        request.execute(self.persistence.as_ref()).await
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Hands out one [`CacheStore`] per collection of an app.
///
/// Every caller asking for the same collection shares its work queue.
pub struct CacheRegistry {
    persistence: Arc<dyn Persistence>,
    namespace: String,
    app_key: String,
    stores: std::sync::Mutex<HashMap<String, CacheStore>>,
}

impl CacheRegistry {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        namespace: impl Into<String>,
        app_key: impl Into<String>,
    ) -> Self {
        CacheRegistry {
            persistence,
            namespace: namespace.into(),
            app_key: app_key.into(),
            stores: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// The store for `collection`, created on first use.
    pub fn store(&self, collection: &str) -> CacheStore {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        stores
            .entry(collection.to_string())
            .or_insert_with(|| {
                CacheStore::new(
                    self.persistence.clone(),
                    self.namespace.as_str(),
                    self.app_key.as_str(),
                    collection,
                )
            })
            .clone()
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    /// Removes every cached entity of the app, across collections.
    pub async fn clear_all(&self) -> DbResult<u64> {
        let removed = self.persistence.clear(&self.app_key, None).await?;
        debug!(app_key = %self.app_key, count = removed, "Cleared local cache");
        Ok(removed)
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("namespace", &self.namespace)
            .field("app_key", &self.app_key)
            .finish_non_exhaustive()
    }
}

fn validate(query: Option<&Query>) -> DbResult<()> {
    if let Some(query) = query {
        query.ensure_supported_offline()?;
    }
    Ok(())
}

fn assign_local_id(mut entity: Entity) -> Entity {
    if entity.id().is_none() {
        entity.set_id(generate_local_id());
        entity.mark_local();
    }
    entity
}

// =============================================================================
// Unit Tests
// =============================================================================
