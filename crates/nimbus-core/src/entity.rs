//! # Entity Documents
//!
//! An entity is an opaque JSON object owned by the application. The SDK only
//! cares about three reserved fields:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  {                                                                      │
//! │    "_id":  "5f1c...",          ← identity (local or server-assigned)    │
//! │    "_kmd": { "local": true,    ← bookkeeping, see metadata.rs           │
//! │              "lmt": "...",                                              │
//! │              "ect": "..." },                                            │
//! │    "_acl": { "creator": "..." } ← access control, opaque to sync        │
//! │    ...application fields...                                             │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual Identity
//! Entities created offline get a client-generated id (24 hex characters, the
//! same shape as server ids) and `_kmd.local = true`. The push step swaps that
//! id for the one the server assigns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Reserved field holding the entity id.
pub const ID_FIELD: &str = "_id";

/// Reserved field holding the bookkeeping metadata.
pub const KMD_FIELD: &str = "_kmd";

/// Reserved field holding the access control list.
pub const ACL_FIELD: &str = "_acl";

/// Length of generated ids.
const LOCAL_ID_LEN: usize = 24;

// =============================================================================
// Entity
// =============================================================================

/// A single stored document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, Value>);

impl Entity {
    /// Creates an empty entity.
    pub fn new() -> Self {
        Entity(Map::new())
    }

    /// Creates an entity from any JSON value.
    ///
    /// ## Errors
    /// `CoreError::InvalidEntity` if the value is not a JSON object.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        match value {
            Value::Object(map) => Ok(Entity(map)),
            other => Err(CoreError::InvalidEntity(format!(
                "expected a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Parses a JSON array (or a single object) into entities.
    pub fn many_from_value(value: Value) -> CoreResult<Vec<Self>> {
        match value {
            Value::Array(items) => items.into_iter().map(Entity::from_value).collect(),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![Entity::from_value(other)?]),
        }
    }

    /// Returns the entity id, if present and non-empty.
    pub fn id(&self) -> Option<&str> {
        self.0
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Sets the entity id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    /// Removes and returns the entity id.
    pub fn remove_id(&mut self) -> Option<Value> {
        self.0.remove(ID_FIELD)
    }

    /// Returns a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Resolves a dot-separated path (`"_kmd.lmt"`, `"entity._id"`).
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Sets a top-level field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Removes a top-level field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Returns true if the entity has the given top-level field.
    pub fn contains_key(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Borrows the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Mutably borrows the underlying JSON object.
    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Consumes the entity, returning the JSON object.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Consumes the entity, returning a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Entity {
    fn from(map: Map<String, Value>) -> Self {
        Entity(map)
    }
}

impl TryFrom<Value> for Entity {
    type Error = CoreError;

    fn try_from(value: Value) -> CoreResult<Self> {
        Entity::from_value(value)
    }
}

impl From<Entity> for Value {
    fn from(entity: Entity) -> Self {
        entity.into_value()
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Generates a client-side entity id.
///
/// Ids are 24 lowercase hex characters so they are indistinguishable in shape
/// from server-assigned ids; `_kmd.local` is what marks them as temporary.
pub fn generate_local_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(LOCAL_ID_LEN);
    id
}

/// Collects the ids of the given entities, skipping entities without one.
pub fn entity_ids<'a>(entities: impl IntoIterator<Item = &'a Entity>) -> Vec<String> {
    entities
        .into_iter()
        .filter_map(|e| e.id().map(str::to_string))
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
