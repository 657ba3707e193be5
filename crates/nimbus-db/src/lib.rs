//! # nimbus-db: Local Storage for the Nimbus SDK
//!
//! Everything that reads or writes local storage: the persistence seam, its
//! two backends and the per-collection cache store built on top.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Nimbus Local Data Flow                           │
//! │                                                                         │
//! │  Collection façade / sync queue (nimbus-sync)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     nimbus-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  CacheStore   │    │ LocalRequest  │    │ Persistence  │  │   │
//! │  │   │  (cache.rs)   │───►│ (request.rs)  │───►│   backends   │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ work queue    │    │ GET/POST/PUT/ │    │ Memory       │  │   │
//! │  │   │ local ids     │    │ DELETE by     │    │ SQLite       │  │   │
//! │  │   │               │    │ pathname      │    │ (pool.rs)    │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`cache`] - Per-collection cache store with a serialised work queue, and
//!   the registry that hands out one shared store per collection
//! - [`request`] - Pathname-addressed local requests
//! - [`persistence`] - The backend trait
//! - [`memory`] - In-memory backend
//! - [`pool`] - SQLite backend (connection pool + configuration)
//! - [`migrations`] - Embedded database migrations
//! - [`repository`] - SQL for the SQLite backend
//! - [`error`] - Storage error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nimbus_db::{CacheStore, Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("nimbus.db")).await?;
//! let books = CacheStore::new(Arc::new(db), "appdata", "kid_app", "books");
//!
//! let saved = books.save_one(entity).await?;
//! let all = books.find(None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod memory;
pub mod migrations;
pub mod persistence;
pub mod pool;
pub mod repository;
pub mod request;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::{CacheRegistry, CacheStore};
pub use error::{DbError, DbResult};
pub use memory::MemoryPersistence;
pub use persistence::Persistence;
pub use pool::{Database, DbConfig};
pub use repository::entity::EntityRepository;
pub use request::{LocalRequest, Method, Pathname};
