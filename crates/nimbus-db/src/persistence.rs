//! # Persistence Trait
//!
//! The seam between the cache store and whatever actually keeps bytes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   CacheStore ──► LocalRequest ──► dyn Persistence                      │
//! │                                        │                                │
//! │                           ┌────────────┴────────────┐                   │
//! │                           ▼                         ▼                   │
//! │                  MemoryPersistence           Database (SQLite)          │
//! │                  (tests, ephemeral)          (durable)                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Backends are dumb key/value stores scoped by `(app_key, collection, id)`.
//! They never evaluate queries and never assign ids.

use async_trait::async_trait;
use nimbus_core::Entity;

use crate::error::DbResult;

#[async_trait]
pub trait Persistence: Send + Sync {
    /// All entities of a collection, in insertion order.
    async fn find(&self, app_key: &str, collection: &str) -> DbResult<Vec<Entity>>;

    async fn find_by_id(&self, app_key: &str, collection: &str, id: &str)
        -> DbResult<Option<Entity>>;

    /// Inserts or replaces entities by `_id`. Every entity must have one.
    async fn save(&self, app_key: &str, collection: &str, entities: Vec<Entity>)
        -> DbResult<Vec<Entity>>;

    /// Removes one entity, returning it if it existed.
    async fn remove_by_id(&self, app_key: &str, collection: &str, id: &str)
        -> DbResult<Option<Entity>>;

    /// Removes every entity of one collection, or of the whole app when
    /// `collection` is `None`. Returns the number removed.
    async fn clear(&self, app_key: &str, collection: Option<&str>) -> DbResult<u64>;

    /// Releases held resources. Later calls fail on backends that hold any.
    async fn close(&self) {}
}
