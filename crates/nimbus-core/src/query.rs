//! # Query Evaluator
//!
//! A small MongoDB-style query: filter + sort + skip/limit + field projection.
//! The same value is evaluated locally against cached entities
//! ([`Query::process`]) and serialised for the remote service
//! ([`Query::to_query_params`]).
//!
//! ## Evaluation Pipeline
//! ```text
//! entities ──► filter ──► sort ──► skip ──► limit ──► project ──► result
//! ```
//!
//! ## Offline Support
//! Geo operators need server-side indexes. A query using one of them reports
//! `is_supported_offline() == false` and `process` refuses it.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::{Entity, ACL_FIELD, ID_FIELD, KMD_FIELD};
use crate::error::{CoreError, CoreResult};

/// Operators only the remote service can evaluate.
const SERVER_ONLY_OPERATORS: &[&str] = &[
    "$nearSphere",
    "$near",
    "$geoWithin",
    "$geoIntersects",
    "$within",
];

/// Fields always kept by a projection.
const PROTECTED_FIELDS: &[&str] = &[ID_FIELD, KMD_FIELD, ACL_FIELD];

// =============================================================================
// Query Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub order: SortOrder,
}

/// Filter, ordering and paging over entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub filter: Map<String, Value>,

    #[serde(default)]
    pub sort: Vec<SortField>,

    #[serde(default)]
    pub limit: Option<usize>,

    #[serde(default)]
    pub skip: usize,

    /// Projection; empty means all fields.
    #[serde(default)]
    pub fields: Vec<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a raw filter document.
    ///
    /// ## Errors
    /// `CoreError::InvalidQuery` if `filter` is not a JSON object.
    pub fn from_filter(filter: Value) -> CoreResult<Self> {
        match filter {
            Value::Object(filter) => Ok(Self {
                filter,
                ..Self::default()
            }),
            Value::Null => Ok(Self::default()),
            _ => Err(CoreError::InvalidQuery(
                "filter must be a JSON object".to_string(),
            )),
        }
    }

    // -------------------------------------------------------------------------
    // Builders
    // -------------------------------------------------------------------------

    pub fn equal_to(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(field.into(), value.into());
        self
    }

    pub fn not_equal_to(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_operator(field, "$ne", value.into())
    }

    /// Matches when the field equals any of `values` (`$in`).
    pub fn contains<V: Into<Value>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect::<Vec<_>>();
        self.with_operator(field, "$in", Value::Array(values))
    }

    /// Matches when the field equals none of `values` (`$nin`).
    pub fn not_contained_in<V: Into<Value>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect::<Vec<_>>();
        self.with_operator(field, "$nin", Value::Array(values))
    }

    pub fn greater_than(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_operator(field, "$gt", value.into())
    }

    pub fn greater_than_or_equal_to(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_operator(field, "$gte", value.into())
    }

    pub fn less_than(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_operator(field, "$lt", value.into())
    }

    pub fn less_than_or_equal_to(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_operator(field, "$lte", value.into())
    }

    pub fn exists(self, field: impl Into<String>, exists: bool) -> Self {
        self.with_operator(field, "$exists", Value::Bool(exists))
    }

    /// Geo proximity. Evaluated by the remote service only.
    pub fn near(self, field: impl Into<String>, longitude: f64, latitude: f64) -> Self {
        self.with_operator(field, "$nearSphere", serde_json::json!([longitude, latitude]))
    }

    /// Both this query's filter and `other`'s must match.
    pub fn and(mut self, other: Query) -> Self {
        self.filter = combine("$and", self.filter, other.filter);
        self
    }

    /// Either this query's filter or `other`'s must match.
    pub fn or(mut self, other: Query) -> Self {
        self.filter = combine("$or", self.filter, other.filter);
        self
    }

    pub fn ascending(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortField {
            field: field.into(),
            order: SortOrder::Ascending,
        });
        self
    }

    pub fn descending(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortField {
            field: field.into(),
            order: SortOrder::Descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    fn with_operator(mut self, field: impl Into<String>, op: &str, operand: Value) -> Self {
        let field = field.into();
        match self.filter.get_mut(&field) {
            Some(Value::Object(ops)) if is_operator_object(ops) => {
                ops.insert(op.to_string(), operand);
            }
            _ => {
                let mut ops = Map::new();
                ops.insert(op.to_string(), operand);
                self.filter.insert(field, Value::Object(ops));
            }
        }
        self
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// True if the query has no filter, sort, paging or projection.
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
            && self.sort.is_empty()
            && self.limit.is_none()
            && self.skip == 0
            && self.fields.is_empty()
    }

    /// True unless the filter uses a server-only operator.
    pub fn is_supported_offline(&self) -> bool {
        find_server_only_operator(&self.filter).is_none()
    }

    /// Fails with `UnsupportedOffline` if the filter needs the server.
    pub fn ensure_supported_offline(&self) -> CoreResult<()> {
        match find_server_only_operator(&self.filter) {
            Some(operator) => Err(CoreError::UnsupportedOffline {
                operator: operator.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Re-roots every field path under `prefix`.
    ///
    /// Used to run an entity query against ledger rows, where the entity
    /// lives under the `entity` field. `limit` and `skip` are dropped: rows
    /// are de-duplicated after they are read, so paging raw rows would
    /// select an arbitrary subset of entities.
    pub fn nest_under(&self, prefix: &str) -> Query {
        Query {
            filter: nest_filter(&self.filter, prefix),
            sort: self
                .sort
                .iter()
                .map(|s| SortField {
                    field: format!("{prefix}.{}", s.field),
                    order: s.order,
                })
                .collect(),
            limit: None,
            skip: 0,
            fields: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Evaluation
    // -------------------------------------------------------------------------

    /// Returns true if the entity satisfies the filter.
    pub fn matches(&self, entity: &Entity) -> CoreResult<bool> {
        matches_filter(entity.as_map(), &self.filter)
    }

    /// Applies filter, sort, skip, limit and projection.
    ///
    /// ## Errors
    /// - `UnsupportedOffline` for server-only operators
    /// - `UnsupportedOperator` / `InvalidQuery` for malformed filters
    pub fn process(&self, entities: Vec<Entity>) -> CoreResult<Vec<Entity>> {
        self.ensure_supported_offline()?;

        let mut result = Vec::with_capacity(entities.len());
        for entity in entities {
            if self.matches(&entity)? {
                result.push(entity);
            }
        }

        if !self.sort.is_empty() {
            result.sort_by(|a, b| self.compare_entities(a, b));
        }

        let result = result
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX));

        if self.fields.is_empty() {
            Ok(result.collect())
        } else {
            Ok(result.map(|e| self.project(e)).collect())
        }
    }

    fn compare_entities(&self, a: &Entity, b: &Entity) -> Ordering {
        for sort in &self.sort {
            let av = a.get_path(&sort.field).unwrap_or(&Value::Null);
            let bv = b.get_path(&sort.field).unwrap_or(&Value::Null);
            let ord = match sort.order {
                SortOrder::Ascending => compare_values(av, bv),
                SortOrder::Descending => compare_values(bv, av),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    fn project(&self, entity: Entity) -> Entity {
        let mut map = entity.into_map();
        map.retain(|key, _| {
            PROTECTED_FIELDS.contains(&key.as_str()) || self.fields.iter().any(|f| f == key)
        });
        Entity::from(map)
    }

    // -------------------------------------------------------------------------
    // Remote Encoding
    // -------------------------------------------------------------------------

    /// Encodes the query as URL parameters for the remote service.
    pub fn to_query_params(&self) -> CoreResult<Vec<(String, String)>> {
        let mut params = Vec::new();

        if !self.filter.is_empty() {
            params.push(("query".to_string(), serde_json::to_string(&self.filter)?));
        }

        if !self.sort.is_empty() {
            // Built by hand so multi-key sort order survives serialisation.
            let mut parts = Vec::with_capacity(self.sort.len());
            for sort in &self.sort {
                let direction = match sort.order {
                    SortOrder::Ascending => 1,
                    SortOrder::Descending => -1,
                };
                parts.push(format!("{}:{direction}", serde_json::to_string(&sort.field)?));
            }
            params.push(("sort".to_string(), format!("{{{}}}", parts.join(","))));
        }

        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        if self.skip > 0 {
            params.push(("skip".to_string(), self.skip.to_string()));
        }

        if !self.fields.is_empty() {
            params.push(("fields".to_string(), self.fields.join(",")));
        }

        Ok(params)
    }
}

// =============================================================================
// Filter Helpers
// =============================================================================

fn combine(op: &str, left: Map<String, Value>, right: Map<String, Value>) -> Map<String, Value> {
    let parts = [left, right]
        .into_iter()
        .filter(|f| !f.is_empty())
        .map(Value::Object)
        .collect::<Vec<_>>();

    match parts.len() {
        0 => Map::new(),
        1 => match parts.into_iter().next() {
            Some(Value::Object(only)) => only,
            _ => Map::new(),
        },
        _ => {
            let mut combined = Map::new();
            combined.insert(op.to_string(), Value::Array(parts));
            combined
        }
    }
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

fn find_server_only_operator(filter: &Map<String, Value>) -> Option<&'static str> {
    fn walk(value: &Value) -> Option<&'static str> {
        match value {
            Value::Object(map) => find_server_only_operator(map),
            Value::Array(items) => items.iter().find_map(walk),
            _ => None,
        }
    }

    for (key, value) in filter {
        if let Some(op) = SERVER_ONLY_OPERATORS
            .iter()
            .copied()
            .find(|op| *op == key.as_str())
        {
            return Some(op);
        }
        if let Some(op) = walk(value) {
            return Some(op);
        }
    }
    None
}

fn nest_filter(filter: &Map<String, Value>, prefix: &str) -> Map<String, Value> {
    filter
        .iter()
        .map(|(key, value)| match (key.as_str(), value) {
            ("$and" | "$or" | "$nor", Value::Array(parts)) => {
                let nested = parts
                    .iter()
                    .map(|part| match part {
                        Value::Object(sub) => Value::Object(nest_filter(sub, prefix)),
                        other => other.clone(),
                    })
                    .collect();
                (key.clone(), Value::Array(nested))
            }
            _ if key.starts_with('$') => (key.clone(), value.clone()),
            _ => (format!("{prefix}.{key}"), value.clone()),
        })
        .collect()
}

fn get_field<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

// =============================================================================
// Matching
// =============================================================================

fn matches_filter(doc: &Map<String, Value>, filter: &Map<String, Value>) -> CoreResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in logical_operands(key, condition)? {
                    if !matches_filter(doc, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in logical_operands(key, condition)? {
                    if matches_filter(doc, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for sub in logical_operands(key, condition)? {
                    if matches_filter(doc, sub)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => {
                return Err(CoreError::UnsupportedOperator(op.to_string()));
            }
            path => matches_condition(get_field(doc, path), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn logical_operands<'a>(op: &str, value: &'a Value) -> CoreResult<Vec<&'a Map<String, Value>>> {
    let items = value
        .as_array()
        .ok_or_else(|| CoreError::InvalidQuery(format!("{op} expects an array")))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| CoreError::InvalidQuery(format!("{op} expects an array of objects")))
        })
        .collect()
}

fn matches_condition(value: Option<&Value>, condition: &Value) -> CoreResult<bool> {
    match condition {
        Value::Object(ops) if is_operator_object(ops) => {
            for (op, operand) in ops {
                if !evaluate_operator(value, op, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equals_lifted(value, condition)),
    }
}

/// Equality with array lifting: `{tags: "a"}` matches `tags: ["a", "b"]`.
fn equals_lifted(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(actual) => actual == expected,
    }
}

fn evaluate_operator(value: Option<&Value>, op: &str, operand: &Value) -> CoreResult<bool> {
    match op {
        "$eq" => Ok(equals_lifted(value, operand)),
        "$ne" => Ok(!equals_lifted(value, operand)),
        "$gt" => Ok(compare_lifted(value, operand, |o| o == Ordering::Greater)),
        "$gte" => Ok(compare_lifted(value, operand, |o| o != Ordering::Less)),
        "$lt" => Ok(compare_lifted(value, operand, |o| o == Ordering::Less)),
        "$lte" => Ok(compare_lifted(value, operand, |o| o != Ordering::Greater)),
        "$in" => {
            let items = array_operand(op, operand)?;
            Ok(items.iter().any(|item| equals_lifted(value, item)))
        }
        "$nin" => {
            let items = array_operand(op, operand)?;
            Ok(!items.iter().any(|item| equals_lifted(value, item)))
        }
        "$all" => {
            let items = array_operand(op, operand)?;
            Ok(match value {
                Some(Value::Array(actual)) => items.iter().all(|item| actual.contains(item)),
                _ => false,
            })
        }
        "$exists" => {
            let wanted = operand
                .as_bool()
                .ok_or_else(|| CoreError::InvalidQuery("$exists expects a boolean".to_string()))?;
            Ok(value.is_some() == wanted)
        }
        "$size" => {
            let expected = operand
                .as_u64()
                .ok_or_else(|| CoreError::InvalidQuery("$size expects a number".to_string()))?;
            Ok(matches!(value, Some(Value::Array(items)) if items.len() as u64 == expected))
        }
        "$not" => Ok(!matches_condition(value, operand)?),
        op if SERVER_ONLY_OPERATORS.contains(&op) => Err(CoreError::UnsupportedOffline {
            operator: op.to_string(),
        }),
        other => Err(CoreError::UnsupportedOperator(other.to_string())),
    }
}

fn array_operand<'a>(op: &str, operand: &'a Value) -> CoreResult<&'a Vec<Value>> {
    operand
        .as_array()
        .ok_or_else(|| CoreError::InvalidQuery(format!("{op} expects an array")))
}

/// Range comparison. Missing and null values never satisfy a range.
fn compare_lifted(value: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    if operand.is_null() {
        return false;
    }
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Array(items)) if !operand.is_array() => items
            .iter()
            .any(|item| !item.is_null() && same_kind(item, operand) && accept(compare_values(item, operand))),
        Some(actual) => same_kind(actual, operand) && accept(compare_values(actual, operand)),
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

/// Total order over JSON values used for sorting.
///
/// Nulls sort last. Across types: number < string < bool < other.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Number(_) => 0,
        Value::String(_) => 1,
        Value::Bool(_) => 2,
        _ => 3,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entities(values: Value) -> Vec<Entity> {
        Entity::many_from_value(values).unwrap()
    }

    fn ids(entities: &[Entity]) -> Vec<&str> {
        entities.iter().filter_map(|e| e.id()).collect()
    }

    fn books() -> Vec<Entity> {
        entities(json!([
            {"_id": "1", "title": "Dune", "pages": 412, "tags": ["scifi", "classic"]},
            {"_id": "2", "title": "Emma", "pages": 474, "tags": ["classic"]},
            {"_id": "3", "title": "Neuromancer", "pages": 271},
            {"_id": "4", "title": "Beloved", "pages": null, "author": {"name": "Morrison"}}
        ]))
    }

    #[test]
    fn test_empty_query_returns_everything() {
        let result = Query::new().process(books()).unwrap();
        assert_eq!(ids(&result), vec!["1", "2", "3", "4"]);
        assert!(Query::new().is_empty());
    }

    #[test]
    fn test_equality_and_array_lifting() {
        let q = Query::new().equal_to("tags", "classic");
        assert_eq!(ids(&q.process(books()).unwrap()), vec!["1", "2"]);

        let q = Query::new().equal_to("author.name", "Morrison");
        assert_eq!(ids(&q.process(books()).unwrap()), vec!["4"]);
    }

    #[test]
    fn test_range_operators_merge_on_same_field() {
        let q = Query::new()
            .greater_than("pages", 300)
            .less_than_or_equal_to("pages", 474);
        assert_eq!(
            Value::Object(q.filter.clone()),
            json!({"pages": {"$gt": 300, "$lte": 474}})
        );
        assert_eq!(ids(&q.process(books()).unwrap()), vec!["1", "2"]);
    }

    #[test]
    fn test_null_never_satisfies_range() {
        let q = Query::new().less_than("pages", 1000);
        assert_eq!(ids(&q.process(books()).unwrap()), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_in_nin_exists() {
        let q = Query::new().contains("_id", ["1", "3"]);
        assert_eq!(ids(&q.process(books()).unwrap()), vec!["1", "3"]);

        let q = Query::new().not_contained_in("_id", ["1", "3"]);
        assert_eq!(ids(&q.process(books()).unwrap()), vec!["2", "4"]);

        let q = Query::new().exists("tags", false);
        assert_eq!(ids(&q.process(books()).unwrap()), vec!["3", "4"]);
    }

    #[test]
    fn test_and_or() {
        let q = Query::new()
            .equal_to("title", "Dune")
            .or(Query::new().equal_to("title", "Emma"));
        assert_eq!(ids(&q.process(books()).unwrap()), vec!["1", "2"]);

        let q = Query::new()
            .equal_to("tags", "classic")
            .and(Query::new().less_than("pages", 450));
        assert_eq!(ids(&q.process(books()).unwrap()), vec!["1"]);

        let q = Query::new().and(Query::new().equal_to("_id", "3"));
        assert_eq!(Value::Object(q.filter), json!({"_id": "3"}));
    }

    #[test]
    fn test_sort_skip_limit() {
        let q = Query::new().ascending("pages").skip(1).limit(2);
        assert_eq!(ids(&q.process(books()).unwrap()), vec!["1", "2"]);

        let q = Query::new().descending("title");
        assert_eq!(ids(&q.process(books()).unwrap()), vec!["3", "2", "1", "4"]);
    }

    #[test]
    fn test_projection_keeps_reserved_fields() {
        let items = entities(json!([{"_id": "1", "_kmd": {"local": true}, "a": 1, "b": 2}]));
        let result = Query::new().fields(["a"]).process(items).unwrap();
        assert_eq!(
            result[0].clone().into_value(),
            json!({"_id": "1", "_kmd": {"local": true}, "a": 1})
        );
    }

    #[test]
    fn test_geo_queries_are_server_only() {
        let q = Query::new().near("location", -73.9, 40.7);
        assert!(!q.is_supported_offline());
        let err = q.process(books()).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedOffline { ref operator } if operator == "$nearSphere"));

        let nested = Query::new()
            .equal_to("a", 1)
            .or(Query::new().near("location", 0.0, 0.0));
        assert!(!nested.is_supported_offline());
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let q = Query::from_filter(json!({"pages": {"$where": "x"}})).unwrap();
        assert!(matches!(
            q.process(books()),
            Err(CoreError::UnsupportedOperator(_))
        ));
        assert!(Query::from_filter(json!([1])).is_err());
    }

    #[test]
    fn test_nest_under() {
        let q = Query::new()
            .contains("_id", ["a", "b"])
            .or(Query::new().equal_to("name", "x"))
            .ascending("name")
            .limit(1)
            .skip(1);
        let nested = q.nest_under("entity");
        assert_eq!((nested.limit, nested.skip), (None, None));

        assert_eq!(
            Value::Object(nested.filter.clone()),
            json!({"$or": [
                {"entity._id": {"$in": ["a", "b"]}},
                {"entity.name": "x"}
            ]})
        );
        assert_eq!(nested.sort[0].field, "entity.name");

        let row = Entity::from_value(json!({"key": 1, "entity": {"_id": "b", "name": "y"}})).unwrap();
        assert!(nested.matches(&row).unwrap());
    }

    #[test]
    fn test_query_params() {
        let q = Query::new()
            .equal_to("name", "x")
            .descending("pages")
            .ascending("name")
            .limit(10)
            .skip(5)
            .fields(["name", "pages"]);
        let params = q.to_query_params().unwrap();

        assert_eq!(
            params,
            vec![
                ("query".to_string(), r#"{"name":"x"}"#.to_string()),
                ("sort".to_string(), r#"{"pages":-1,"name":1}"#.to_string()),
                ("limit".to_string(), "10".to_string()),
                ("skip".to_string(), "5".to_string()),
                ("fields".to_string(), "name,pages".to_string()),
            ]
        );
        assert!(Query::new().to_query_params().unwrap().is_empty());
    }

    #[test]
    fn test_compare_values_nulls_last() {
        assert_eq!(compare_values(&Value::Null, &json!(1)), Ordering::Greater);
        assert_eq!(compare_values(&json!(1), &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
    }
}
