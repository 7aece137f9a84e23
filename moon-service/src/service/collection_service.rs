//! # Collection Service
//!
//! Orchestrates collection lifecycle: DDL against the live database plus
//! the registry commit, in a fixed order with compensation.
//!
//! ## Create Protocol
//!
//! ```text
//! validate ──► CREATE TABLE ──► unique indexes ──► registry commit
//!                                                      │ failure
//!                                                      ▼
//!                                               DROP TABLE (compensate)
//! ```
//!
//! A crash between DDL and registry commit leaves an orphaned table; the
//! consistency checker reconciles it at next boot.
//!
//! ## Storage Shape
//!
//! Every collection table carries the two hidden system columns and one
//! SQL column per user column:
//!
//! ```sql
//! CREATE TABLE "products" (
//!     pkid  <auto-increment primary key>,
//!     id    <text> NOT NULL,          -- ULID, unique indexed
//!     ...user columns, SQL-nullable...
//! )
//! ```
//!
//! Nullability and defaults are enforced at the validation boundary, not
//! in DDL: SQLite cannot alter column constraints in place, and Moon's
//! ingress validation already rejects anything the schema forbids before
//! SQL runs. Uniqueness is real DDL (named unique indexes) because only
//! the database can enforce it under concurrency.
//!
//! ## Schema Updates
//!
//! Supported: add column, drop column, toggle unique, change nullability
//! or default (registry-only). Rejected with 400: changing a column's
//! type (incompatible migrations are out of scope).

use std::sync::Arc;
use tracing::{error, info};

use shared::database::Db;
use shared::errors::{ApiError, ApiResult};

use crate::domain::schema::{Collection, Column};
use crate::service::registry::SchemaRegistry;

#[derive(Clone)]
pub struct CollectionService {
    db: Db,
    registry: Arc<SchemaRegistry>,
}

impl CollectionService {
    pub fn new(db: Db, registry: Arc<SchemaRegistry>) -> Self {
        Self { db, registry }
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub async fn list(&self) -> Vec<Collection> {
        self.registry.list().await
    }

    pub async fn get(&self, name: &str) -> ApiResult<Collection> {
        self.registry
            .get(name)
            .await
            .ok_or_else(|| ApiError::not_found(format!("collection '{}' not found", name)))
    }

    // =========================================================================
    // CREATE
    // =========================================================================

    /// Creates the storage table and commits the registry entry.
    pub async fn create(&self, collection: Collection) -> ApiResult<Collection> {
        collection.validate()?;

        if self.registry.exists(&collection.name).await {
            return Err(ApiError::conflict(format!(
                "collection '{}' already exists",
                collection.name
            )));
        }
        if self.db.table_exists(&collection.name).await? {
            // Unregistered leftover table; refuse rather than clobber
            return Err(ApiError::conflict(format!(
                "a table named '{}' already exists",
                collection.name
            )));
        }

        self.execute_create_ddl(&collection).await?;

        // Registry commit; on failure compensate with DROP so neither side
        // keeps a half-created collection.
        if let Err(e) = self.registry.set(collection.clone()).await {
            error!(collection = %collection.name, error = %e, "Registry commit failed, dropping table");
            let drop_sql = format!(
                "DROP TABLE {}",
                self.db.dialect().quote_ident(&collection.name)
            );
            if let Err(drop_err) = self.db.execute(&drop_sql, &[]).await {
                error!(collection = %collection.name, error = %drop_err, "Compensating drop failed");
            }
            return Err(e);
        }

        info!(collection = %collection.name, columns = collection.columns.len(), "Collection created");
        Ok(collection)
    }

    async fn execute_create_ddl(&self, collection: &Collection) -> ApiResult<()> {
        let d = self.db.dialect();
        let table = d.quote_ident(&collection.name);

        let mut defs: Vec<String> = vec![
            format!("pkid {}", d.auto_increment_pk()),
            format!(
                "id {} NOT NULL",
                d.sql_type(shared::database::ColumnType::String)
            ),
        ];
        for column in &collection.columns {
            defs.push(format!(
                "{} {}",
                d.quote_ident(&column.name),
                d.sql_type(column.column_type)
            ));
        }

        let create_sql = format!("CREATE TABLE {} ({})", table, defs.join(", "));
        self.db.execute(&create_sql, &[]).await?;

        self.create_unique_index(&collection.name, "id").await?;
        for column in &collection.columns {
            if column.unique {
                self.create_unique_index(&collection.name, &column.name)
                    .await?;
            }
        }
        Ok(())
    }

    fn unique_index_name(table: &str, column: &str) -> String {
        format!("ux_{}_{}", table, column)
    }

    async fn create_unique_index(&self, table: &str, column: &str) -> ApiResult<()> {
        let d = self.db.dialect();
        let sql = format!(
            "CREATE UNIQUE INDEX {} ON {} ({})",
            d.quote_ident(&Self::unique_index_name(table, column)),
            d.quote_ident(table),
            d.quote_ident(column)
        );
        self.db.execute(&sql, &[]).await.map_err(|e| match e {
            ApiError::Database(db_err) => ApiError::from_db_conflict(
                db_err,
                format!("values in column '{}' are not unique", column),
            ),
            other => other,
        })?;
        Ok(())
    }

    // =========================================================================
    // UPDATE
    // =========================================================================

    /// Applies a full-replacement schema update as a column diff.
    pub async fn update(&self, name: &str, columns: Vec<Column>) -> ApiResult<Collection> {
        let current = self.get(name).await?;
        let updated = Collection {
            name: name.to_string(),
            columns,
        };
        updated.validate()?;

        let d = self.db.dialect();
        let table = d.quote_ident(name);

        // Type changes are not migrations we perform
        for column in &updated.columns {
            if let Some(existing) = current.column(&column.name) {
                if existing.column_type != column.column_type {
                    return Err(ApiError::validation(format!(
                        "column '{}': type changes are not supported",
                        column.name
                    )));
                }
            }
        }

        // Adding a required column to a non-empty table has no value to
        // backfill with
        let row_count = self.row_count(name).await?;
        for column in &updated.columns {
            if current.column(&column.name).is_none()
                && row_count > 0
                && !column.nullable
                && column.default_value.is_none()
            {
                return Err(ApiError::validation(format!(
                    "column '{}': cannot add a non-nullable column without a default to a non-empty collection",
                    column.name
                )));
            }
        }

        // Dropped columns (unique index first; SQLite refuses to drop an
        // indexed column)
        for column in &current.columns {
            if updated.column(&column.name).is_none() {
                if column.unique {
                    let drop_index =
                        d.drop_index_sql(name, &Self::unique_index_name(name, &column.name));
                    self.db.execute(&drop_index, &[]).await?;
                }
                let sql = format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    table,
                    d.quote_ident(&column.name)
                );
                self.db.execute(&sql, &[]).await?;
            }
        }

        // Added columns
        for column in &updated.columns {
            if current.column(&column.name).is_none() {
                let sql = format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    table,
                    d.quote_ident(&column.name),
                    d.sql_type(column.column_type)
                );
                self.db.execute(&sql, &[]).await?;
                if column.unique {
                    self.create_unique_index(name, &column.name).await?;
                }
            }
        }

        // Unique toggles on kept columns
        for column in &updated.columns {
            if let Some(existing) = current.column(&column.name) {
                if column.unique && !existing.unique {
                    self.create_unique_index(name, &column.name).await?;
                } else if !column.unique && existing.unique {
                    let drop_index =
                        d.drop_index_sql(name, &Self::unique_index_name(name, &column.name));
                    self.db.execute(&drop_index, &[]).await?;
                }
            }
        }

        self.registry.set(updated.clone()).await?;
        info!(collection = %name, columns = updated.columns.len(), "Collection schema updated");
        Ok(updated)
    }

    // =========================================================================
    // DESTROY
    // =========================================================================

    /// Removes the registry entry and drops the storage table.
    pub async fn destroy(&self, name: &str) -> ApiResult<()> {
        // 404 before any side effect
        self.get(name).await?;

        // Registry first so the API stops serving the collection even if
        // the drop fails; the checker reconciles the leftover table.
        self.registry.remove(name).await?;

        let sql = format!("DROP TABLE {}", self.db.dialect().quote_ident(name));
        if let Err(e) = self.db.execute(&sql, &[]).await {
            error!(collection = %name, error = %e, "Failed to drop collection table");
        }

        info!(collection = %name, "Collection destroyed");
        Ok(())
    }

    async fn row_count(&self, name: &str) -> ApiResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS value FROM {}",
            self.db.dialect().quote_ident(name)
        );
        let row = self.db.fetch_optional(&sql, &[]).await?;
        match row {
            Some(row) => Ok(sqlx::Row::try_get::<i64, _>(&row, 0)?),
            None => Ok(0),
        }
    }
}
