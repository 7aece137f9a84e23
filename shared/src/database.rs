//! # Database Layer & Dialect Adapter
//!
//! Connection pooling plus the single place where SQLite, PostgreSQL and
//! MySQL differences live.
//!
//! ## Why an Adapter?
//!
//! Moon builds every statement dynamically (collections are defined at
//! runtime), so queries cannot be checked against a fixed schema at compile
//! time. The rules:
//!
//! - Nothing above this module branches on the backend.
//! - The query builder consults [`Dialect`] for placeholder style and
//!   identifier quoting only.
//! - DDL fragments (column types, auto-increment key, `RETURNING` support)
//!   come from [`Dialect`] methods.
//!
//! ## Dialect Differences That Matter
//!
//! | Concern | SQLite | PostgreSQL | MySQL |
//! |---------|--------|------------|-------|
//! | Placeholders | `?` | `$1`, `$2`, … | `?` |
//! | Identifier quoting | `"name"` | `"name"` | `` `name` `` |
//! | Auto-increment key | `INTEGER PRIMARY KEY AUTOINCREMENT` | `BIGSERIAL PRIMARY KEY` | `BIGINT AUTO_INCREMENT PRIMARY KEY` |
//! | Insert id | `last_insert_rowid` | `RETURNING` | `LAST_INSERT_ID` |
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use shared::database::{Db, SqlValue};
//!
//! let db = Db::connect(&config.database).await?;
//! let rows = db
//!     .fetch_all(
//!         "SELECT id FROM moon_users WHERE role = ?",
//!         &[SqlValue::Text("admin".into())],
//!     )
//!     .await?;
//! ```

use crate::config::DatabaseConfig;
use crate::errors::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Row, Transaction};
use std::time::Duration;
use tracing::info;

// =============================================================================
// Dialect
// =============================================================================

/// The SQL backend in use, parsed from the connection string scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    /// Parses the dialect from a `scheme://…` connection string.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown schemes.
    pub fn from_connection_string(url: &str) -> ApiResult<Self> {
        if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if url.starts_with("mysql://") {
            Ok(Self::MySql)
        } else {
            Err(ApiError::internal(format!(
                "unsupported database scheme in connection string: {}",
                url.split("://").next().unwrap_or("<none>")
            )))
        }
    }

    /// Placeholder for the `n`-th bind parameter (1-based).
    ///
    /// PostgreSQL numbers its parameters; SQLite and MySQL use positional
    /// `?`.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${}", n),
            Self::Sqlite | Self::MySql => "?".to_string(),
        }
    }

    /// Quotes an identifier (table or column name).
    ///
    /// Callers must have validated the identifier against the name grammar
    /// first; quoting is not an escape hatch for arbitrary input.
    pub fn quote_ident(&self, name: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", name),
            Self::Sqlite | Self::Postgres => format!("\"{}\"", name),
        }
    }

    /// DDL fragment for the hidden auto-increment primary key (`pkid`).
    pub fn auto_increment_pk(&self) -> &'static str {
        match self {
            Self::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Self::Postgres => "BIGSERIAL PRIMARY KEY",
            Self::MySql => "BIGINT AUTO_INCREMENT PRIMARY KEY",
        }
    }

    /// SQL column type for a user-facing column type.
    ///
    /// MySQL gets VARCHAR where a UNIQUE index must be possible; TEXT
    /// columns there cannot be uniquely indexed without a prefix length.
    pub fn sql_type(&self, ty: ColumnType) -> &'static str {
        match (ty, self) {
            (ColumnType::String, Self::MySql) => "VARCHAR(255)",
            (ColumnType::String, _) => "TEXT",
            (ColumnType::Integer, Self::Sqlite) => "INTEGER",
            (ColumnType::Integer, _) => "BIGINT",
            (ColumnType::Decimal, Self::MySql) => "VARCHAR(64)",
            (ColumnType::Decimal, _) => "TEXT",
            (ColumnType::Boolean, Self::Sqlite) => "INTEGER",
            (ColumnType::Boolean, Self::Postgres) => "BOOLEAN",
            (ColumnType::Boolean, Self::MySql) => "TINYINT(1)",
            (ColumnType::Datetime, Self::MySql) => "VARCHAR(64)",
            (ColumnType::Datetime, _) => "TEXT",
            (ColumnType::Json, _) => "TEXT",
        }
    }

    /// CAST target for floating-point aggregate results.
    ///
    /// `SUM`/`AVG` return backend-specific numeric types (NUMERIC on
    /// PostgreSQL) that the Any driver cannot decode; casting to the
    /// dialect's double type keeps aggregate rows decodable everywhere.
    pub fn float_cast_type(&self) -> &'static str {
        match self {
            Self::Sqlite => "REAL",
            Self::Postgres => "DOUBLE PRECISION",
            Self::MySql => "DOUBLE",
        }
    }

    /// `DROP INDEX` statement for a named index on a table.
    ///
    /// MySQL scopes the index to the table; the others use a global name.
    pub fn drop_index_sql(&self, table: &str, index: &str) -> String {
        match self {
            Self::MySql => format!(
                "DROP INDEX {} ON {}",
                self.quote_ident(index),
                self.quote_ident(table)
            ),
            Self::Sqlite | Self::Postgres => {
                format!("DROP INDEX {}", self.quote_ident(index))
            }
        }
    }

    /// Whether `INSERT … RETURNING` is available.
    ///
    /// Where it is not, the caller falls back to the driver's last-insert-id
    /// mechanism.
    pub fn supports_returning(&self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// Best-effort mapping from an introspected database type back to a
    /// column type. Used when re-registering orphaned tables.
    pub fn infer_column_type(&self, db_type: &str) -> ColumnType {
        let upper = db_type.to_uppercase();
        if upper.contains("TINYINT(1)") || upper.contains("BOOL") {
            ColumnType::Boolean
        } else if upper.contains("INT") {
            ColumnType::Integer
        } else if upper.contains("DECIMAL")
            || upper.contains("NUMERIC")
            || upper.contains("REAL")
            || upper.contains("FLOAT")
            || upper.contains("DOUBLE")
        {
            ColumnType::Decimal
        } else if upper.contains("TIMESTAMP") || upper.contains("DATE") {
            ColumnType::Datetime
        } else if upper.contains("JSON") {
            ColumnType::Json
        } else {
            ColumnType::String
        }
    }

    /// Name used in logs and the health probe.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        }
    }
}

// =============================================================================
// Column Types
// =============================================================================

/// The six user-facing column types.
///
/// Lives next to [`Dialect`] because the DDL type map and the row decoding
/// rules both hinge on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    Decimal,
    Boolean,
    Datetime,
    Json,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Datetime => "datetime",
            Self::Json => "json",
        }
    }

    /// Parses a column type from its wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "decimal" => Some(Self::Decimal),
            "boolean" => Some(Self::Boolean),
            "datetime" => Some(Self::Datetime),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

// =============================================================================
// Bind Values
// =============================================================================

/// A scalar ready to be bound to a placeholder.
///
/// The Any driver supports exactly this set; richer domain values are
/// lowered to it before reaching the database.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

/// Binds a slice of [`SqlValue`]s to a query in order.
pub fn bind_values<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    args: &[SqlValue],
) -> Query<'q, Any, AnyArguments<'q>> {
    for arg in args {
        query = match arg {
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

// =============================================================================
// Database Handle
// =============================================================================

/// Connection pool plus dialect. Cloning is cheap (`AnyPool` is `Arc`-based).
#[derive(Debug, Clone)]
pub struct Db {
    pool: AnyPool,
    dialect: Dialect,
}

impl Db {
    /// Connects to the database described by the configuration.
    ///
    /// Installs the compiled-in Any drivers, parses the dialect from the
    /// connection string and applies pool bounds. SQLite file databases are
    /// opened in create mode so a fresh deployment works out of the box.
    pub async fn connect(config: &DatabaseConfig) -> ApiResult<Self> {
        sqlx::any::install_default_drivers();

        let dialect = Dialect::from_connection_string(&config.connection_string)?;

        // Ensure SQLite creates the database file if it doesn't exist
        let url = if dialect == Dialect::Sqlite
            && !config.connection_string.contains("mode=")
            && !config.connection_string.contains(":memory:")
        {
            format!("{}?mode=rwc", config.connection_string)
        } else {
            config.connection_string.clone()
        };

        info!(
            dialect = dialect.as_str(),
            max_open_conns = config.max_open_conns,
            max_idle_conns = config.max_idle_conns,
            "Creating database connection pool"
        );

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_open_conns)
            .min_connections(config.max_idle_conns)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&url)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to create database pool");
                ApiError::Database(e)
            })?;

        info!("Database connection pool created successfully");

        Ok(Self { pool, dialect })
    }

    /// The active dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Raw pool access for transactions and advanced operations.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Executes a statement, returning the number of affected rows.
    pub async fn execute(&self, sql: &str, args: &[SqlValue]) -> ApiResult<u64> {
        let result = bind_values(sqlx::query(sql), args)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Fetches all rows for a query.
    pub async fn fetch_all(&self, sql: &str, args: &[SqlValue]) -> ApiResult<Vec<AnyRow>> {
        let rows = bind_values(sqlx::query(sql), args)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Fetches at most one row.
    pub async fn fetch_optional(&self, sql: &str, args: &[SqlValue]) -> ApiResult<Option<AnyRow>> {
        let row = bind_values(sqlx::query(sql), args)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Begins a transaction. Commit and rollback are exactly-once; dropping
    /// the handle without committing rolls back.
    pub async fn begin(&self) -> ApiResult<Transaction<'static, Any>> {
        Ok(self.pool.begin().await?)
    }

    /// Whether a table exists, via the dialect's catalog.
    pub async fn table_exists(&self, table: &str) -> ApiResult<bool> {
        let (sql, args) = match self.dialect {
            Dialect::Sqlite => (
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?".to_string(),
                vec![SqlValue::Text(table.to_string())],
            ),
            Dialect::Postgres => (
                "SELECT tablename FROM pg_tables WHERE schemaname = 'public' AND tablename = $1"
                    .to_string(),
                vec![SqlValue::Text(table.to_string())],
            ),
            Dialect::MySql => (
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = ?"
                    .to_string(),
                vec![SqlValue::Text(table.to_string())],
            ),
        };

        Ok(self.fetch_optional(&sql, &args).await?.is_some())
    }

    /// Lists all table names visible to the application.
    pub async fn list_tables(&self) -> ApiResult<Vec<String>> {
        let sql = match self.dialect {
            Dialect::Sqlite => {
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
            Dialect::Postgres => {
                "SELECT tablename AS name FROM pg_tables \
                 WHERE schemaname = 'public' ORDER BY tablename"
            }
            Dialect::MySql => {
                "SELECT table_name AS name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() ORDER BY table_name"
            }
        };

        let rows = self.fetch_all(sql, &[]).await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.try_get::<String, _>(0)?);
        }
        Ok(names)
    }

    /// Introspects a table's columns as `(name, db_type, nullable)`.
    ///
    /// Used by the consistency checker to rebuild registry entries for
    /// orphaned tables.
    pub async fn table_columns(&self, table: &str) -> ApiResult<Vec<IntrospectedColumn>> {
        let mut out = Vec::new();
        match self.dialect {
            Dialect::Sqlite => {
                // PRAGMA does not accept bind parameters; the table name has
                // been validated against the identifier grammar upstream.
                let sql = format!("PRAGMA table_info({})", self.dialect.quote_ident(table));
                let rows = self.fetch_all(&sql, &[]).await?;
                for row in rows {
                    let name: String = row.try_get("name")?;
                    let db_type: String = row.try_get("type")?;
                    let notnull: i64 = row.try_get("notnull").unwrap_or(0);
                    out.push(IntrospectedColumn {
                        name,
                        db_type,
                        nullable: notnull == 0,
                    });
                }
            }
            Dialect::Postgres | Dialect::MySql => {
                let sql = match self.dialect {
                    Dialect::Postgres => {
                        "SELECT column_name, data_type, is_nullable \
                         FROM information_schema.columns \
                         WHERE table_name = $1 ORDER BY ordinal_position"
                    }
                    _ => {
                        "SELECT column_name, data_type, is_nullable \
                         FROM information_schema.columns \
                         WHERE table_schema = DATABASE() AND table_name = ? \
                         ORDER BY ordinal_position"
                    }
                };
                let rows = self
                    .fetch_all(sql, &[SqlValue::Text(table.to_string())])
                    .await?;
                for row in rows {
                    let name: String = row.try_get(0)?;
                    let db_type: String = row.try_get(1)?;
                    let is_nullable: String = row.try_get(2)?;
                    out.push(IntrospectedColumn {
                        name,
                        db_type,
                        nullable: is_nullable.eq_ignore_ascii_case("yes"),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Verifies database connectivity (`SELECT 1`).
    pub async fn health_check(&self) -> ApiResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(ApiError::Database)?;
        Ok(())
    }
}

/// One column as reported by the database catalog.
#[derive(Debug, Clone)]
pub struct IntrospectedColumn {
    pub name: String,
    pub db_type: String,
    pub nullable: bool,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_connection_string() {
        assert_eq!(
            Dialect::from_connection_string("sqlite://moon.db").unwrap(),
            Dialect::Sqlite
        );
        assert_eq!(
            Dialect::from_connection_string("postgres://u:p@host/db").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(
            Dialect::from_connection_string("postgresql://u:p@host/db").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(
            Dialect::from_connection_string("mysql://u:p@host/db").unwrap(),
            Dialect::MySql
        );
        assert!(Dialect::from_connection_string("oracle://x").is_err());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(1), "$1");
        assert_eq!(Dialect::Postgres.placeholder(7), "$7");
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
        assert_eq!(Dialect::MySql.placeholder(3), "?");
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(Dialect::Sqlite.quote_ident("products"), "\"products\"");
        assert_eq!(Dialect::Postgres.quote_ident("products"), "\"products\"");
        assert_eq!(Dialect::MySql.quote_ident("products"), "`products`");
    }

    #[test]
    fn test_sql_type_map() {
        assert_eq!(Dialect::Sqlite.sql_type(ColumnType::Boolean), "INTEGER");
        assert_eq!(Dialect::Postgres.sql_type(ColumnType::Boolean), "BOOLEAN");
        assert_eq!(Dialect::MySql.sql_type(ColumnType::Boolean), "TINYINT(1)");
        assert_eq!(Dialect::MySql.sql_type(ColumnType::String), "VARCHAR(255)");
        assert_eq!(Dialect::Postgres.sql_type(ColumnType::Integer), "BIGINT");
    }

    #[test]
    fn test_only_postgres_supports_returning() {
        assert!(Dialect::Postgres.supports_returning());
        assert!(!Dialect::Sqlite.supports_returning());
        assert!(!Dialect::MySql.supports_returning());
    }

    #[test]
    fn test_infer_column_type() {
        let d = Dialect::Sqlite;
        assert_eq!(d.infer_column_type("INTEGER"), ColumnType::Integer);
        assert_eq!(d.infer_column_type("bigint"), ColumnType::Integer);
        assert_eq!(d.infer_column_type("TEXT"), ColumnType::String);
        assert_eq!(d.infer_column_type("VARCHAR(255)"), ColumnType::String);
        assert_eq!(Dialect::MySql.infer_column_type("tinyint(1)"), ColumnType::Boolean);
        assert_eq!(d.infer_column_type("TIMESTAMP"), ColumnType::Datetime);
        assert_eq!(d.infer_column_type("NUMERIC"), ColumnType::Decimal);
    }

    #[test]
    fn test_column_type_round_trip() {
        for ty in [
            ColumnType::String,
            ColumnType::Integer,
            ColumnType::Decimal,
            ColumnType::Boolean,
            ColumnType::Datetime,
            ColumnType::Json,
        ] {
            assert_eq!(ColumnType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(ColumnType::parse("float"), None);
    }
}
