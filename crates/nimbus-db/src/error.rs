//! # Storage Error Types
//!
//! Error types for local storage operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)      CoreError (bad query / entity)        │
//! │       │                               │                                 │
//! │       └───────────────┬───────────────┘                                 │
//! │                       ▼                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError (nimbus-sync) ← What SDK callers see                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use nimbus_core::CoreError;
use thiserror::Error;

/// Local storage errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in local storage.
    #[error("Entity not found in {collection}: {id}")]
    NotFound { collection: String, id: String },

    /// The query cannot be evaluated locally.
    ///
    /// ## When This Occurs
    /// - Server-only operators (`$nearSphere`)
    /// - Unknown or malformed operators
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A local request addressed something that isn't a collection or entity.
    #[error("Invalid pathname: {0}")]
    InvalidPathname(String),

    /// A local request with a method/target combination storage can't serve.
    #[error("Unsupported request: {0}")]
    UnsupportedRequest(String),

    /// Entity shape errors from nimbus-core (missing `_id`, not an object).
    #[error(transparent)]
    Core(CoreError),

    /// Stored JSON could not be (de)serialised.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a collection and id.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// True for errors caused by the caller's arguments.
    pub fn is_parameter_error(&self) -> bool {
        matches!(
            self,
            DbError::InvalidQuery(_) | DbError::InvalidPathname(_) | DbError::UnsupportedRequest(_)
        )
    }
}

/// Query errors become `InvalidQuery`; everything else is wrapped.
impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        if err.is_query_error() {
            DbError::InvalidQuery(err.to_string())
        } else {
            DbError::Core(err)
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::Database       → DbError::QueryFailed
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// sqlx::Error::PoolClosed     → DbError::ConnectionFailed
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => DbError::QueryFailed(db_err.message().to_string()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for storage operations.
pub type DbResult<T> = Result<T, DbError>;
