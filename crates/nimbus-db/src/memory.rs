//! In-memory [`Persistence`] backend.
//!
//! Nothing survives the process. Used by tests and by applications that only
//! want an ephemeral cache.

use std::collections::HashMap;

use async_trait::async_trait;
use nimbus_core::{CoreError, Entity};
use tokio::sync::RwLock;

use crate::error::DbResult;
use crate::persistence::Persistence;

type CollectionKey = (String, String);

#[derive(Debug, Default)]
pub struct MemoryPersistence {
    // Vec keeps insertion order; collections are small enough for linear lookup.
    collections: RwLock<HashMap<CollectionKey, Vec<Entity>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(app_key: &str, collection: &str) -> CollectionKey {
    (app_key.to_string(), collection.to_string())
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn find(&self, app_key: &str, collection: &str) -> DbResult<Vec<Entity>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&key(app_key, collection))
            .cloned()
            .unwrap_or_default())
    }

    async fn find_by_id(
        &self,
        app_key: &str,
        collection: &str,
        id: &str,
    ) -> DbResult<Option<Entity>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&key(app_key, collection))
            .and_then(|rows| rows.iter().find(|e| e.id() == Some(id)))
            .cloned())
    }

    async fn save(
        &self,
        app_key: &str,
        collection: &str,
        entities: Vec<Entity>,
    ) -> DbResult<Vec<Entity>> {
        if entities.iter().any(|e| e.id().is_none()) {
            return Err(CoreError::MissingId {
                collection: collection.to_string(),
            }
            .into());
        }

        let mut collections = self.collections.write().await;
        let rows = collections.entry(key(app_key, collection)).or_default();

        for entity in &entities {
            match rows.iter_mut().find(|row| row.id() == entity.id()) {
                Some(existing) => *existing = entity.clone(),
                None => rows.push(entity.clone()),
            }
        }

        Ok(entities)
    }

    async fn remove_by_id(
        &self,
        app_key: &str,
        collection: &str,
        id: &str,
    ) -> DbResult<Option<Entity>> {
        let mut collections = self.collections.write().await;
        let Some(rows) = collections.get_mut(&key(app_key, collection)) else {
            return Ok(None);
        };
        Ok(rows
            .iter()
            .position(|e| e.id() == Some(id))
            .map(|index| rows.remove(index)))
    }

    async fn clear(&self, app_key: &str, collection: Option<&str>) -> DbResult<u64> {
        let mut collections = self.collections.write().await;
        let mut removed = 0u64;
        collections.retain(|(app, name), rows| {
            let matches = app == app_key && collection.map_or(true, |c| c == name);
            if matches {
                removed += rows.len() as u64;
            }
            !matches
        });
        Ok(removed)
    }
}
