//! # Sync Error Types
//!
//! The error taxonomy SDK callers see.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Remote         │  │   Transient     │  │     Caller              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  NotFound       │  │  Server         │  │  Parameter              │ │
//! │  │  Insufficient-  │  │  Network        │  │  InvalidMode            │ │
//! │  │   Credentials   │  │  Timeout        │  │  PendingSync            │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Ledger       │  │  Configuration  │  │      Local              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Sync           │  │  InvalidConfig  │  │  Database               │ │
//! │  │  (missing id)   │  │  InvalidUrl     │  │  Serialization          │ │
//! │  │                 │  │  ConfigLoad/Save│  │  Internal               │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use nimbus_core::CoreError;
use nimbus_db::DbError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Every failure the SDK surfaces.
///
/// Errors are `Clone` so push results can carry them per row.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// Entity, collection or app absent on the remote service.
    ///
    /// Benign when applying a DELETE: the entity is already gone.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The active credentials may not perform this request.
    #[error("Insufficient credentials: {0}")]
    InsufficientCredentials(String),

    /// The remote service failed (5xx or an unclassified 4xx).
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The request never got a response.
    #[error("Network error: {0}")]
    Network(String),

    /// The request exceeded its timeout.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    // =========================================================================
    // Caller Errors
    // =========================================================================
    /// Invalid argument or query.
    #[error("Invalid parameter: {0}")]
    Parameter(String),

    /// Reads are refused while local writes are unsynced.
    #[error(
        "Unable to read {collection}: {count} entities must be synced first. \
         Call push() to sync them to the backend"
    )]
    PendingSync { collection: String, count: usize },

    /// The operation is not available in this store mode.
    #[error("Invalid store mode: {0}")]
    InvalidMode(String),

    // =========================================================================
    // Ledger Errors
    // =========================================================================
    /// Pending operation ledger invariant violated.
    #[error("Sync error: {0}")]
    Sync(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Local storage failed.
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { .. } => SyncError::NotFound(err.to_string()),
            DbError::Core(core) => core.into(),
            DbError::Serialization(e) => SyncError::Serialization(e.to_string()),
            e if e.is_parameter_error() => SyncError::Parameter(e.to_string()),
            e => SyncError::Database(e.to_string()),
        }
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MissingId { .. } => SyncError::Sync(err.to_string()),
            CoreError::Serialization(e) => SyncError::Serialization(e.to_string()),
            e => SyncError::Parameter(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if a later attempt could succeed unchanged.
    ///
    /// ## Retryable Errors
    /// - Server failures
    /// - Network failures
    /// - Timeouts
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Server { .. } | SyncError::Network(_) | SyncError::Timeout(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }

    pub fn is_insufficient_credentials(&self) -> bool {
        matches!(self, SyncError::InsufficientCredentials(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
