//! # Entity Repository
//!
//! SQL access to the `entities` table.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  entities                                                               │
//! │  ┌──────────┬────────────┬────────┬──────────────────┬──────────────┐  │
//! │  │ app_key  │ collection │ id     │ data (JSON text) │ updated_at   │  │
//! │  ├──────────┼────────────┼────────┼──────────────────┼──────────────┤  │
//! │  │ kid_app  │ books      │ 5f1c.. │ {"_id":"5f1c"..} │ 2024-..      │  │
//! │  │ kid_app  │ _nimbus_.. │ 42     │ {"key":42,...}   │ 2024-..      │  │
//! │  └──────────┴────────────┴────────┴──────────────────┴──────────────┘  │
//! │                                                                         │
//! │  UNIQUE (app_key, collection, id); rows read back in rowid order       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use nimbus_core::{CoreError, Entity};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// Repository for stored entity documents.
#[derive(Debug, Clone)]
pub struct EntityRepository {
    pool: SqlitePool,
}

impl EntityRepository {
    /// Creates a new EntityRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EntityRepository { pool }
    }

    /// Loads every entity of a collection in insertion order.
    pub async fn find_all(&self, app_key: &str, collection: &str) -> DbResult<Vec<Entity>> {
        let rows = sqlx::query(
            "SELECT data FROM entities WHERE app_key = ?1 AND collection = ?2 ORDER BY rowid",
        )
        .bind(app_key)
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| decode(row.try_get::<String, _>("data")?))
            .collect()
    }

    pub async fn find_by_id(
        &self,
        app_key: &str,
        collection: &str,
        id: &str,
    ) -> DbResult<Option<Entity>> {
        let data: Option<String> = sqlx::query_scalar(
            "SELECT data FROM entities WHERE app_key = ?1 AND collection = ?2 AND id = ?3",
        )
        .bind(app_key)
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        data.map(decode).transpose()
    }

    /// Inserts or replaces entities in one transaction.
    ///
    /// ## Errors
    /// `CoreError::MissingId` (wrapped) if any entity lacks `_id`; nothing is
    /// written in that case.
    pub async fn upsert_many(
        &self,
        app_key: &str,
        collection: &str,
        entities: &[Entity],
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        for entity in entities {
            let id = entity.id().ok_or_else(|| CoreError::MissingId {
                collection: collection.to_string(),
            })?;
            let data = serde_json::to_string(entity)?;

            sqlx::query(
                r#"
                INSERT INTO entities (app_key, collection, id, data, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT (app_key, collection, id)
                DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
                "#,
            )
            .bind(app_key)
            .bind(collection)
            .bind(id)
            .bind(data)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(collection = %collection, count = entities.len(), "Upserted entities");
        Ok(())
    }

    /// Deletes one entity, returning the removed document.
    pub async fn delete_by_id(
        &self,
        app_key: &str,
        collection: &str,
        id: &str,
    ) -> DbResult<Option<Entity>> {
        let data: Option<String> = sqlx::query_scalar(
            "DELETE FROM entities WHERE app_key = ?1 AND collection = ?2 AND id = ?3 RETURNING data",
        )
        .bind(app_key)
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        data.map(decode).transpose()
    }

    /// Deletes a whole collection, or the whole app when `collection` is None.
    ///
    /// ## Returns
    /// Number of deleted rows.
    pub async fn delete_all(&self, app_key: &str, collection: Option<&str>) -> DbResult<u64> {
        let result = match collection {
            Some(collection) => {
                sqlx::query("DELETE FROM entities WHERE app_key = ?1 AND collection = ?2")
                    .bind(app_key)
                    .bind(collection)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM entities WHERE app_key = ?1")
                    .bind(app_key)
                    .execute(&self.pool)
                    .await?
            }
        };

        Ok(result.rows_affected())
    }

    /// Counts stored rows of a collection.
    pub async fn count(&self, app_key: &str, collection: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM entities WHERE app_key = ?1 AND collection = ?2",
        )
        .bind(app_key)
        .bind(collection)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

fn decode(data: String) -> DbResult<Entity> {
    Ok(serde_json::from_str(&data)?)
}
