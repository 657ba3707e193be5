//! # Repository Module
//!
//! SQL access behind a small typed API. The SQLite [`Database`](crate::Database)
//! implements [`Persistence`](crate::Persistence) on top of these.
//!
//! ## Available Repositories
//!
//! - [`EntityRepository`](entity::EntityRepository) - Entity document storage

pub mod entity;
