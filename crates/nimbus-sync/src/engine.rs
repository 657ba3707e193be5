//! # Sync Engine
//!
//! A collection's view of the shared [`SyncQueue`]. Holds no state of its
//! own: every call is forwarded with the ledger query narrowed to rows of
//! this collection.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   SyncEngine("books") ─┐                                               │
//! │   SyncEngine("films") ─┼──► SyncQueue (one ledger per client)          │
//! │   SyncEngine("users") ─┘      rows filtered by collection == name      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use nimbus_core::{Entity, PendingOperation, Query};

use crate::error::SyncResult;
use crate::queue::{PushResult, SyncQueue};

/// Ledger row field naming the row's collection.
const COLLECTION_FIELD: &str = "collection";

#[derive(Debug, Clone)]
pub struct SyncEngine {
    collection: String,
    queue: SyncQueue,
}

impl SyncEngine {
    pub fn new(collection: impl Into<String>, queue: SyncQueue) -> Self {
        SyncEngine {
            collection: collection.into(),
            queue,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn count(&self, query: Option<&Query>) -> SyncResult<usize> {
        self.queue.count(Some(&self.scope(query))).await
    }

    pub async fn entities(&self, query: Option<&Query>) -> SyncResult<Vec<PendingOperation>> {
        self.queue.entities(Some(&self.scope(query))).await
    }

    pub async fn push(&self, query: Option<&Query>) -> SyncResult<Vec<PushResult>> {
        self.queue.push(Some(&self.scope(query))).await
    }

    pub async fn clear(&self, query: Option<&Query>) -> SyncResult<usize> {
        self.queue.clear(Some(&self.scope(query))).await
    }

    pub async fn add_create_operation(&self, entities: Vec<Entity>) -> SyncResult<Vec<Entity>> {
        self.queue.add_create_operation(&self.collection, entities).await
    }

    pub async fn add_update_operation(&self, entities: Vec<Entity>) -> SyncResult<Vec<Entity>> {
        self.queue.add_update_operation(&self.collection, entities).await
    }

    pub async fn add_delete_operation(&self, entities: Vec<Entity>) -> SyncResult<Vec<Entity>> {
        self.queue.add_delete_operation(&self.collection, entities).await
    }

    /// `collection == name` AND the caller's ledger query. Sort and paging
    /// of the caller's query are kept.
    fn scope(&self, query: Option<&Query>) -> Query {
        let query = query.cloned().unwrap_or_default();
        let filter = Query::new()
            .equal_to(COLLECTION_FIELD, self.collection.as_str())
            .and(query.clone())
            .filter;
        Query { filter, ..query }
    }
}
