//! # Error Types
//!
//! Domain-specific error types for nimbus-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  nimbus-core errors (this file)                                        │
//! │  └── CoreError        - Entity shape and query evaluation failures     │
//! │                                                                         │
//! │  nimbus-db errors (separate crate)                                     │
//! │  └── DbError          - Local storage failures                         │
//! │                                                                         │
//! │  nimbus-sync errors (separate crate)                                   │
//! │  └── SyncError        - What SDK callers see                           │
//! │                                                                         │
//! │  Flow: CoreError → DbError → SyncError → Application                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised by the pure data model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The query is malformed (wrong operand type, unknown sort direction...).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The query uses an operator only the remote service can evaluate.
    ///
    /// ## When This Occurs
    /// - Geo operators such as `$nearSphere` evaluated against the local cache
    #[error("Query operator {operator} is not supported offline")]
    UnsupportedOffline { operator: String },

    /// The query uses an operator the evaluator does not know.
    #[error("Unsupported query operator: {0}")]
    UnsupportedOperator(String),

    /// A value that should be an entity document is not a JSON object.
    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    /// An entity without `_id` was used where an id is required.
    #[error("Entity in collection {collection} has no _id")]
    MissingId { collection: String },

    /// JSON (de)serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Returns true if the error was caused by a bad query rather than bad data.
    pub fn is_query_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidQuery(_)
                | CoreError::UnsupportedOffline { .. }
                | CoreError::UnsupportedOperator(_)
        )
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::UnsupportedOffline {
            operator: "$nearSphere".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Query operator $nearSphere is not supported offline"
        );

        let err = CoreError::MissingId {
            collection: "books".to_string(),
        };
        assert_eq!(err.to_string(), "Entity in collection books has no _id");
    }

    #[test]
    fn test_query_error_classification() {
        assert!(CoreError::InvalidQuery("bad".into()).is_query_error());
        assert!(CoreError::UnsupportedOperator("$where".into()).is_query_error());
        assert!(!CoreError::InvalidEntity("not an object".into()).is_query_error());
    }
}
