//! # nimbus-sync: Offline Sync for the Nimbus SDK
//!
//! Collections that keep working while disconnected: writes land in the
//! local cache and an ordered ledger of pending operations, and are pushed
//! to the remote service later (or right away when online).
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Layer Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      Client (owning context)                     │  │
//! │  │                                                                  │  │
//! │  │  ClientConfig, Session, Network, CacheRegistry, SyncQueue       │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ collection(name, DataStoreType)        │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 Collection (Cache / Sync / Network)              │  │
//! │  │  find / find_by_id / count      create / update / save           │  │
//! │  │  remove / remove_by_id / clear  push / pull / sync               │  │
//! │  └──────────┬─────────────────────────────┬─────────────────────────┘  │
//! │             ▼                             ▼                             │
//! │  ┌────────────────────┐       ┌────────────────────────┐               │
//! │  │  CacheStore        │       │  SyncEngine            │               │
//! │  │  (nimbus-db)       │       │  (collection scope)    │               │
//! │  └────────────────────┘       └───────────┬────────────┘               │
//! │                                           ▼                             │
//! │                               ┌────────────────────────┐               │
//! │                               │  SyncQueue             │──► Network    │
//! │                               │  ledger + batched push │   (reqwest)   │
//! │                               └────────────────────────┘               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`client`] - `Client` and its builder
//! - [`store`] - The `Collection` façade and store modes
//! - [`engine`] - Per-collection view of the sync queue
//! - [`queue`] - Pending operation ledger and the push algorithm
//! - [`delta`] - Delta fetch for network reads
//! - [`network`] - Network trait and HTTP implementation
//! - [`session`] - App credentials and the active user
//! - [`config`] - Client configuration (TOML + environment)
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nimbus_core::{Entity, Query};
//! use nimbus_sync::{Client, ClientConfig, DataStoreType};
//!
//! let client = Client::new(ClientConfig::load(None)?).await?;
//! let books = client.collection("books", DataStoreType::Sync)?;
//!
//! // Works offline: cached and queued.
//! books.save(Entity::from_value(serde_json::json!({"title": "Dune"}))?).await?;
//!
//! // Later, with a connection.
//! let summary = books.sync(Some(Query::new().equal_to("title", "Dune"))).await?;
//! for result in summary.push.iter().filter(|r| r.error.is_some()) {
//!     eprintln!("{} failed: {:?}", result.id, result.error);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod client;
pub mod config;
pub mod delta;
pub mod engine;
pub mod error;
pub mod network;
pub mod queue;
pub mod session;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use network::{AuthType, HttpNetwork, Network, NetworkRequest};
pub use queue::{PushResult, SyncQueue};
pub use session::{ActiveUser, Session};
pub use store::{Collection, DataStoreType, RemoveResult, StoreMode, SyncSummary};
