//! # Local Requests
//!
//! A request-shaped interface over [`Persistence`], mirroring how the remote
//! service is addressed so the cache store can speak one dialect.
//!
//! ## Pathnames
//! ```text
//! /{namespace}/{appKey}/{collection}          ← collection
//! /{namespace}/{appKey}/{collection}/{id}     ← single entity
//! ```
//!
//! ## Method Semantics
//! ```text
//! GET    collection   → JSON array (query applied)
//! GET    entity       → JSON object, NotFound if absent
//! POST   collection   → save body (object or array), echo it back
//! PUT    entity       → save body under the path id, echo it back
//! DELETE entity       → JSON array of the removed entity (0 or 1)
//! DELETE collection   → JSON array of every removed entity (query applied)
//! ```

use std::fmt;

use nimbus_core::{Entity, Query};
use serde_json::Value;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::persistence::Persistence;

// =============================================================================
// Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Pathname
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pathname {
    pub namespace: String,
    pub app_key: String,
    pub collection: String,
    pub id: Option<String>,
}

impl Pathname {
    pub fn collection(
        namespace: impl Into<String>,
        app_key: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Pathname {
            namespace: namespace.into(),
            app_key: app_key.into(),
            collection: collection.into(),
            id: None,
        }
    }

    /// The same collection path narrowed to one entity.
    pub fn with_id(&self, id: impl Into<String>) -> Self {
        Pathname {
            id: Some(id.into()),
            ..self.clone()
        }
    }

    /// Parses `/{namespace}/{appKey}/{collection}[/{id}]`.
    pub fn parse(path: &str) -> DbResult<Self> {
        let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(DbError::InvalidPathname(path.to_string()));
        }

        match parts.as_slice() {
            [namespace, app_key, collection] => Ok(Pathname::collection(*namespace, *app_key, *collection)),
            [namespace, app_key, collection, id] => {
                Ok(Pathname::collection(*namespace, *app_key, *collection).with_id(*id))
            }
            _ => Err(DbError::InvalidPathname(path.to_string())),
        }
    }
}

impl fmt::Display for Pathname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}/{}", self.namespace, self.app_key, self.collection)?;
        if let Some(id) = &self.id {
            write!(f, "/{id}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Local Request
// =============================================================================

#[derive(Debug, Clone)]
pub struct LocalRequest {
    pub method: Method,
    pub pathname: Pathname,
    pub query: Option<Query>,
    pub body: Option<Value>,
}

impl LocalRequest {
    pub fn new(method: Method, pathname: Pathname) -> Self {
        LocalRequest {
            method,
            pathname,
            query: None,
            body: None,
        }
    }

    pub fn get(pathname: Pathname) -> Self {
        Self::new(Method::Get, pathname)
    }

    pub fn post(pathname: Pathname, body: Value) -> Self {
        Self::new(Method::Post, pathname).body(body)
    }

    pub fn put(pathname: Pathname, body: Value) -> Self {
        Self::new(Method::Put, pathname).body(body)
    }

    pub fn delete(pathname: Pathname) -> Self {
        Self::new(Method::Delete, pathname)
    }

    pub fn query(mut self, query: Option<Query>) -> Self {
        self.query = query;
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Runs the request against a persistence backend.
    ///
    /// ## Returns
    /// The response data; see the module docs for its shape per method.
    pub async fn execute(self, persistence: &dyn Persistence) -> DbResult<Value> {
        let Pathname {
            app_key,
            collection,
            id,
            ..
        } = &self.pathname;

        debug!(method = %self.method, path = %self.pathname, "Executing local request");

        match (self.method, id) {
            (Method::Get, Some(id)) => persistence
                .find_by_id(app_key, collection, id)
                .await?
                .map(Entity::into_value)
                .ok_or_else(|| DbError::not_found(collection.as_str(), id.as_str())),

            (Method::Get, None) => {
                let entities = persistence.find(app_key, collection).await?;
                let entities = apply_query(self.query.as_ref(), entities)?;
                Ok(to_array(entities))
            }

            (Method::Post | Method::Put, id) => {
                let body = self.body.ok_or_else(|| {
                    DbError::UnsupportedRequest(format!("{} {} without a body", self.method, self.pathname))
                })?;
                let is_array = body.is_array();
                let mut entities = Entity::many_from_value(body)?;

                if let Some(id) = id {
                    if is_array || entities.len() != 1 {
                        return Err(DbError::UnsupportedRequest(format!(
                            "{} {} expects a single entity",
                            self.method, self.pathname
                        )));
                    }
                    if let Some(entity) = entities.first_mut() {
                        entity.set_id(id.as_str());
                    }
                }

                let saved = persistence.save(app_key, collection, entities).await?;
                if is_array {
                    Ok(to_array(saved))
                } else {
                    Ok(saved.into_iter().next().map(Entity::into_value).unwrap_or(Value::Null))
                }
            }

            (Method::Delete, Some(id)) => {
                let removed = persistence.remove_by_id(app_key, collection, id).await?;
                Ok(to_array(removed.into_iter().collect()))
            }

            (Method::Delete, None) => {
                let entities = persistence.find(app_key, collection).await?;
                let matched = apply_query(self.query.as_ref(), entities)?;

                let mut removed = Vec::with_capacity(matched.len());
                for entity in matched {
                    if let Some(id) = entity.id() {
                        if let Some(gone) = persistence.remove_by_id(app_key, collection, id).await? {
                            removed.push(gone);
                        }
                    }
                }
                Ok(to_array(removed))
            }
        }
    }
}

fn apply_query(query: Option<&Query>, entities: Vec<Entity>) -> DbResult<Vec<Entity>> {
    match query {
        Some(query) => Ok(query.process(entities)?),
        None => Ok(entities),
    }
}

fn to_array(entities: Vec<Entity>) -> Value {
    Value::Array(entities.into_iter().map(Entity::into_value).collect())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPersistence;
    use serde_json::json;

    fn books() -> Pathname {
        Pathname::collection("appdata", "kid_app", "books")
    }

    #[test]
    fn test_pathname_display_and_parse() {
        let path = books().with_id("b1");
        assert_eq!(path.to_string(), "/appdata/kid_app/books/b1");
        assert_eq!(Pathname::parse("/appdata/kid_app/books/b1").unwrap(), path);
        assert_eq!(Pathname::parse("appdata/kid_app/books").unwrap(), books());

        assert!(Pathname::parse("/appdata/kid_app").is_err());
        assert!(Pathname::parse("/appdata//books").is_err());
        assert!(Pathname::parse("/a/b/c/d/e").is_err());
    }

    #[tokio::test]
    async fn test_crud_roundtrip() {
        let store = MemoryPersistence::new();

        let saved = LocalRequest::post(books(), json!([{"_id": "b1", "n": 1}, {"_id": "b2", "n": 2}]))
            .execute(&store)
            .await
            .unwrap();
        assert_eq!(saved.as_array().map(Vec::len), Some(2));

        LocalRequest::put(books().with_id("b1"), json!({"n": 10}))
            .execute(&store)
            .await
            .unwrap();

        let found = LocalRequest::get(books().with_id("b1")).execute(&store).await.unwrap();
        assert_eq!(found, json!({"_id": "b1", "n": 10}));

        let removed = LocalRequest::delete(books().with_id("b1")).execute(&store).await.unwrap();
        assert_eq!(removed, json!([{"_id": "b1", "n": 10}]));

        let err = LocalRequest::get(books().with_id("b1")).execute(&store).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_collection_with_query() {
        let store = MemoryPersistence::new();
        LocalRequest::post(books(), json!([{"_id": "a", "n": 1}, {"_id": "b", "n": 2}, {"_id": "c", "n": 3}]))
            .execute(&store)
            .await
            .unwrap();

        let removed = LocalRequest::delete(books())
            .query(Some(Query::new().greater_than("n", 1)))
            .execute(&store)
            .await
            .unwrap();
        assert_eq!(removed.as_array().map(Vec::len), Some(2));

        let rest = LocalRequest::get(books()).execute(&store).await.unwrap();
        assert_eq!(rest, json!([{"_id": "a", "n": 1}]));
    }

    #[tokio::test]
    async fn test_save_without_body_is_rejected() {
        let store = MemoryPersistence::new();
        let err = LocalRequest::new(Method::Post, books())
            .execute(&store)
            .await
            .unwrap_err();
        assert!(err.is_parameter_error());
    }
}
