//! # Registry Repository
//!
//! Persistence for the schema registry (`moon_collections`). Each row is a
//! collection name plus its ordered column list serialized as JSON.
//!
//! The registry service persists here **before** touching its in-memory
//! map, so the map can always be reconstructed from this table at boot.

use chrono::Utc;
use shared::database::{bind_values, Db, SqlValue};
use shared::errors::{ApiError, ApiResult};
use sqlx::Row;

use crate::domain::entities::format_ts;
use crate::domain::schema::{Collection, Column};

#[derive(Debug, Clone)]
pub struct RegistryRepository {
    db: Db,
}

impl RegistryRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Loads every registered collection, for boot-time reconstruction.
    pub async fn load_all(&self) -> ApiResult<Vec<Collection>> {
        let rows = self
            .db
            .fetch_all(
                "SELECT name, columns FROM moon_collections ORDER BY name ASC",
                &[],
            )
            .await?;

        let mut collections = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let raw: String = row.try_get("columns")?;
            let columns: Vec<Column> = serde_json::from_str(&raw).map_err(|e| {
                ApiError::internal(format!(
                    "malformed column list for collection '{}': {}",
                    name, e
                ))
            })?;
            collections.push(Collection { name, columns });
        }
        Ok(collections)
    }

    /// Creates or replaces a registry entry. Delete-then-insert in one
    /// transaction is the portable upsert across the three dialects.
    pub async fn upsert(&self, collection: &Collection) -> ApiResult<()> {
        let d = self.db.dialect();
        let columns_json = serde_json::to_string(&collection.columns)
            .map_err(|e| ApiError::internal(format!("failed to serialize columns: {}", e)))?;
        let now = format_ts(Utc::now());

        let mut tx = self.db.begin().await?;

        let delete_sql = format!(
            "DELETE FROM moon_collections WHERE name = {}",
            d.placeholder(1)
        );
        bind_values(
            sqlx::query(&delete_sql),
            &[SqlValue::Text(collection.name.clone())],
        )
        .execute(&mut *tx)
        .await?;

        let insert_sql = format!(
            "INSERT INTO moon_collections (name, columns, created_at, updated_at) \
             VALUES ({}, {}, {}, {})",
            d.placeholder(1),
            d.placeholder(2),
            d.placeholder(3),
            d.placeholder(4),
        );
        bind_values(
            sqlx::query(&insert_sql),
            &[
                SqlValue::Text(collection.name.clone()),
                SqlValue::Text(columns_json),
                SqlValue::Text(now.clone()),
                SqlValue::Text(now),
            ],
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Removes a registry entry; returns the number of rows removed.
    pub async fn delete(&self, name: &str) -> ApiResult<u64> {
        let sql = format!(
            "DELETE FROM moon_collections WHERE name = {}",
            self.db.dialect().placeholder(1)
        );
        self.db
            .execute(&sql, &[SqlValue::Text(name.to_string())])
            .await
    }
}
