//! # nimbus-core: Pure Data Model for the Nimbus SDK
//!
//! Entities, their hidden metadata, pending operation records and the query
//! evaluator. Everything here is synchronous and free of I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Nimbus SDK Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Application                                  │   │
//! │  │    client.collection("books", DataStoreType::Sync)              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               nimbus-sync (façade, sync queue, network)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               nimbus-db (cache store, persistence)              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ nimbus-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  entity   │  │ metadata  │  │ operation │  │   query   │  │   │
//! │  │   │  Entity   │  │ _kmd/_acl │  │  ledger   │  │  filter   │  │   │
//! │  │   │  ids      │  │ is_local  │  │   rows    │  │  sort     │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`entity`] - The `Entity` document type and id generation
//! - [`metadata`] - `_kmd` / `_acl` accessors
//! - [`operation`] - Pending operation ledger rows
//! - [`query`] - Filter/sort/paging evaluator
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use nimbus_core::{Entity, Query};
//! use serde_json::json;
//!
//! let mut book = Entity::from_value(json!({"title": "Dune", "pages": 412})).unwrap();
//! book.set_id(nimbus_core::generate_local_id());
//! book.mark_local();
//! assert!(book.is_local());
//!
//! let long_books = Query::new().greater_than("pages", 400);
//! assert!(long_books.matches(&book).unwrap());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod entity;
pub mod error;
pub mod metadata;
pub mod operation;
pub mod query;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use entity::{entity_ids, generate_local_id, Entity, ACL_FIELD, ID_FIELD, KMD_FIELD};
pub use error::{CoreError, CoreResult};
pub use metadata::{Acl, Metadata};
pub use operation::{dedup_latest, OperationState, PendingOperation, SyncMethod};
pub use query::{compare_values, Query, SortField, SortOrder};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default REST namespace for collection data.
pub const DEFAULT_NAMESPACE: &str = "appdata";

/// Name of the collection holding the pending operation ledger.
///
/// One ledger per application, shared by every collection.
pub const SYNC_COLLECTION: &str = "_nimbus_sync";

/// Name of the collection holding the ledger key counter.
pub const SYNC_KEY_COLLECTION: &str = "_nimbus_sync_key";
