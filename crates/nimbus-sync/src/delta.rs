//! # Delta Fetch
//!
//! Network reads that download only what changed since the cached copy.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. Probe:  GET collection?query&fields=_id,_kmd                       │
//! │  2. Diff:   probe _kmd.lmt vs cached _kmd.lmt, per id                  │
//! │  3. Fetch:  GET collection?query={_id:{$in:[..200 ids..]}}  (chunks)   │
//! │  4. Merge:  probe order; fetched copy if changed, else cached copy     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nimbus_core::{Entity, Query, ID_FIELD, KMD_FIELD};
use nimbus_db::Pathname;
use tracing::debug;

use crate::error::SyncResult;
use crate::network::{Network, NetworkRequest};

/// Ids per `$in` request.
pub const ID_CHUNK_SIZE: usize = 200;

/// Reads the query's result from the network, reusing unchanged cached copies.
///
/// Queries with a projection are fetched in full: cached copies carry every
/// field and could not stand in for a projected result.
pub async fn delta_fetch(
    network: &dyn Network,
    timeout: Duration,
    pathname: &Pathname,
    query: Option<&Query>,
    cached: Vec<Entity>,
) -> SyncResult<Vec<Entity>> {
    let path = pathname.to_string();

    if query.is_some_and(|q| !q.fields.is_empty()) {
        let data = NetworkRequest::get(path.as_str())
            .query(query.cloned())
            .execute(network, timeout)
            .await?;
        return Ok(Entity::many_from_value(data)?);
    }

    let probe_query = query
        .cloned()
        .unwrap_or_default()
        .fields([ID_FIELD, KMD_FIELD]);
    let probe = Entity::many_from_value(
        NetworkRequest::get(path.as_str())
            .query(Some(probe_query))
            .execute(network, timeout)
            .await?,
    )?;

    let mut cached: HashMap<String, Entity> = cached
        .into_iter()
        .filter_map(|e| e.id().map(str::to_string).map(|id| (id, e)))
        .collect();

    let changed: Vec<String> = probe
        .iter()
        .filter(|remote| match remote.id().and_then(|id| cached.get(id)) {
            Some(local) => !is_unchanged(local, remote),
            None => true,
        })
        .filter_map(|remote| remote.id().map(str::to_string))
        .collect();

    let mut fetched: HashMap<String, Entity> = HashMap::with_capacity(changed.len());
    for chunk in changed.chunks(ID_CHUNK_SIZE) {
        let data = NetworkRequest::get(path.as_str())
            .query(Some(Query::new().contains(ID_FIELD, chunk.iter().cloned())))
            .execute(network, timeout)
            .await?;
        for entity in Entity::many_from_value(data)? {
            if let Some(id) = entity.id().map(str::to_string) {
                fetched.insert(id, entity);
            }
        }
    }

    debug!(
        path = %path,
        total = probe.len(),
        changed = changed.len(),
        "Delta fetch complete"
    );

    Ok(probe
        .iter()
        .filter_map(|remote| remote.id())
        .filter_map(|id| fetched.remove(id).or_else(|| cached.remove(id)))
        .collect())
}

fn modified_at(entity: &Entity) -> Option<DateTime<Utc>> {
    entity.lmt()
}

/// Same last-modified time on both sides. Entities without one always
/// count as changed.
fn is_unchanged(local: &Entity, remote: &Entity) -> bool {
    match (modified_at(local), modified_at(remote)) {
        (Some(a), Some(b)) => a == b,
        _ => local.lmt_raw().is_some() && local.lmt_raw() == remote.lmt_raw(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::MockNetwork;
    use nimbus_db::Method;
    use serde_json::{json, Value};

    const T1: &str = "2024-01-01T00:00:00+00:00";
    const T2: &str = "2024-02-01T00:00:00+00:00";

    fn entity(value: Value) -> Entity {
        Entity::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_only_changed_entities_are_fetched() {
        let network = MockNetwork::new();
        network.seed(
            "books",
            vec![
                json!({"_id": "a", "title": "A2", "_kmd": {"lmt": T2}}),
                json!({"_id": "b", "title": "B", "_kmd": {"lmt": T1}}),
                json!({"_id": "c", "title": "C", "_kmd": {"lmt": T1}}),
            ],
        );
        let cached = vec![
            entity(json!({"_id": "a", "title": "A1", "_kmd": {"lmt": T1}})),
            entity(json!({"_id": "b", "title": "B-cached", "_kmd": {"lmt": T1}})),
        ];
        let pathname = Pathname::collection("appdata", "kid_app", "books");

        let result = delta_fetch(&network, Duration::from_secs(5), &pathname, None, cached)
            .await
            .unwrap();

        let titles: Vec<&Value> = result.iter().map(|e| e.get("title").unwrap()).collect();
        assert_eq!(titles, vec![&json!("A2"), &json!("B-cached"), &json!("C")]);

        let requests = network.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.method == Method::Get));
        let fetch = requests[1].query.as_ref().unwrap();
        assert_eq!(Value::Object(fetch.filter.clone()), json!({"_id": {"$in": ["a", "c"]}}));
    }

    #[tokio::test]
    async fn test_ids_fetched_in_chunks() {
        let network = MockNetwork::new();
        let remote: Vec<Value> = (0..450).map(|i| json!({"_id": format!("e{i}")})).collect();
        network.seed("books", remote);
        let pathname = Pathname::collection("appdata", "kid_app", "books");

        let result = delta_fetch(&network, Duration::from_secs(5), &pathname, None, Vec::new())
            .await
            .unwrap();
        assert_eq!(result.len(), 450);
        // probe + ceil(450 / 200)
        assert_eq!(network.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_projection_skips_delta() {
        let network = MockNetwork::new();
        network.seed("books", vec![json!({"_id": "a", "title": "A", "pages": 3})]);
        let pathname = Pathname::collection("appdata", "kid_app", "books");
        let query = Query::new().fields(["title"]);

        let result = delta_fetch(&network, Duration::from_secs(5), &pathname, Some(&query), Vec::new())
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert!(result[0].get("pages").is_none());
        assert_eq!(network.requests().len(), 1);
    }
}
