//! # Pending Operations
//!
//! Record types for the pending operation ledger (the "sync queue").
//!
//! ## Ledger Row
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  {                                                                      │
//! │    "_id":        "42",             ← decimal key, storage identity      │
//! │    "key":        42,               ← total order of intent             │
//! │    "collection": "books",                                               │
//! │    "state":      { "method": "PUT" },                                   │
//! │    "entityId":   "5f1c...",                                             │
//! │    "entity":     { ...full snapshot at enqueue time... }                │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutation is logged. De-duplication ("highest key wins") happens when
//! the ledger is read, never when a row is written; see [`dedup_latest`].

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::{Entity, ID_FIELD};
use crate::error::{CoreError, CoreResult};

// =============================================================================
// Sync Method
// =============================================================================

/// The desired mutation, spelled as the HTTP verb that applies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncMethod {
    #[serde(rename = "POST")]
    Create,
    #[serde(rename = "PUT")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

impl SyncMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMethod::Create => "POST",
            SyncMethod::Update => "PUT",
            SyncMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for SyncMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationState {
    pub method: SyncMethod,
}

// =============================================================================
// Pending Operation
// =============================================================================

/// One desired mutation not yet confirmed by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub key: u64,
    pub collection: String,
    pub state: OperationState,
    #[serde(rename = "entityId")]
    pub entity_id: String,
    pub entity: Entity,
}

impl PendingOperation {
    /// Builds a ledger row for an entity.
    ///
    /// ## Errors
    /// `CoreError::MissingId` if the entity has no `_id`. Entities must be
    /// saved to the cache (which assigns ids) before they can be queued.
    pub fn new(
        key: u64,
        collection: impl Into<String>,
        method: SyncMethod,
        entity: Entity,
    ) -> CoreResult<Self> {
        let collection = collection.into();
        let entity_id = entity
            .id()
            .ok_or_else(|| CoreError::MissingId {
                collection: collection.clone(),
            })?
            .to_string();

        Ok(Self {
            key,
            collection,
            state: OperationState { method },
            entity_id,
            entity,
        })
    }

    pub fn method(&self) -> SyncMethod {
        self.state.method
    }

    /// Storage id of the row: the key in decimal.
    pub fn document_id(&self) -> String {
        self.key.to_string()
    }

    /// Serializes the row as a storable document.
    pub fn to_document(&self) -> CoreResult<Entity> {
        let mut doc = Entity::from_value(serde_json::to_value(self)?)?;
        doc.set_id(self.document_id());
        Ok(doc)
    }

    /// Parses a stored document back into a row.
    pub fn from_document(mut doc: Entity) -> CoreResult<Self> {
        doc.remove(ID_FIELD);
        Ok(serde_json::from_value(Value::Object(doc.into_map()))?)
    }
}

/// Sorts rows by key descending and keeps the first row per entity.
///
/// Ids are unique within a collection only, so an entity is identified by
/// `(collection, entity_id)`. The sort is stable so rows sharing a key keep
/// their read order.
pub fn dedup_latest(mut rows: Vec<PendingOperation>) -> Vec<PendingOperation> {
    rows.sort_by(|a, b| b.key.cmp(&a.key));
    let mut seen = HashSet::new();
    rows.retain(|row| seen.insert((row.collection.clone(), row.entity_id.clone())));
    rows
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(key: u64, id: &str, method: SyncMethod, name: &str) -> PendingOperation {
        let entity = Entity::from_value(json!({"_id": id, "name": name})).unwrap();
        PendingOperation::new(key, "books", method, entity).unwrap()
    }

    #[test]
    fn test_method_wire_names() {
        assert_eq!(serde_json::to_value(SyncMethod::Create).unwrap(), json!("POST"));
        assert_eq!(serde_json::to_value(SyncMethod::Update).unwrap(), json!("PUT"));
        assert_eq!(SyncMethod::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_new_requires_id() {
        let err = PendingOperation::new(1, "books", SyncMethod::Create, Entity::new()).unwrap_err();
        assert!(matches!(err, CoreError::MissingId { ref collection } if collection == "books"));
    }

    #[test]
    fn test_document_shape() {
        let doc = op(42, "e1", SyncMethod::Update, "a").to_document().unwrap();
        assert_eq!(
            doc.into_value(),
            json!({
                "_id": "42",
                "key": 42,
                "collection": "books",
                "state": {"method": "PUT"},
                "entityId": "e1",
                "entity": {"_id": "e1", "name": "a"}
            })
        );
    }

    #[test]
    fn test_from_document() {
        let original = op(7, "e1", SyncMethod::Delete, "a");
        let parsed = PendingOperation::from_document(original.to_document().unwrap()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_dedup_keeps_highest_key_per_entity() {
        let rows = vec![
            op(5, "e1", SyncMethod::Update, "old"),
            op(6, "e2", SyncMethod::Create, "other"),
            op(7, "e1", SyncMethod::Update, "new"),
        ];
        let deduped = dedup_latest(rows);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].key, 7);
        assert_eq!(deduped[0].entity.get("name"), Some(&json!("new")));
        assert_eq!(deduped[1].key, 6);
    }

    #[test]
    fn test_dedup_keeps_same_id_in_other_collections() {
        let film = Entity::from_value(json!({"_id": "x1"})).unwrap();
        let rows = vec![
            op(1, "x1", SyncMethod::Update, "book"),
            PendingOperation::new(2, "films", SyncMethod::Update, film).unwrap(),
            op(3, "x1", SyncMethod::Update, "book again"),
        ];
        let deduped = dedup_latest(rows);

        assert_eq!(deduped.len(), 2);
        assert_eq!((deduped[0].key, deduped[0].collection.as_str()), (3, "books"));
        assert_eq!((deduped[1].key, deduped[1].collection.as_str()), (2, "films"));
    }

    #[test]
    fn test_dedup_delete_after_create_wins() {
        let rows = vec![
            op(1, "e1", SyncMethod::Create, "a"),
            op(2, "e1", SyncMethod::Delete, "a"),
        ];
        let deduped = dedup_latest(rows);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].method(), SyncMethod::Delete);
    }
}
