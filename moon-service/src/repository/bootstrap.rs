//! # System Table Bootstrap
//!
//! Creates the `moon_*` system tables on startup, in code, per dialect.
//! The DDL is generated through the dialect adapter so the same bootstrap
//! runs on SQLite, PostgreSQL and MySQL.
//!
//! ## Tables
//!
//! | Table | Purpose |
//! |-------|---------|
//! | `moon_users` | principal accounts |
//! | `moon_refresh_tokens` | hashed single-use refresh tokens |
//! | `moon_apikeys` | hashed service credentials |
//! | `moon_token_blacklist` | revoked access-token hashes |
//! | `moon_collections` | registry metadata (column lists as JSON) |
//!
//! ## Index Strategy
//!
//! Unique constraints are expressed as named `CREATE UNIQUE INDEX`
//! statements rather than inline constraints, because named indexes can be
//! dropped portably later. MySQL has no `CREATE INDEX IF NOT EXISTS`, so
//! tables and their indexes are only created when the table is absent.
//!
//! ## Timestamps
//!
//! Stored as RFC 3339 text everywhere (the Any driver has no datetime
//! codec); `expires_at` ordering comparisons remain correct because
//! RFC 3339 with a fixed UTC offset sorts lexicographically.

use shared::database::{ColumnType, Db};
use shared::errors::ApiResult;
use tracing::info;

/// Creates any missing system table together with its indexes.
pub async fn ensure_system_tables(db: &Db) -> ApiResult<()> {
    let dialect = db.dialect();
    let pk = dialect.auto_increment_pk();
    let text = dialect.sql_type(ColumnType::String);
    // Long-form text (descriptions, serialized column lists); never indexed
    let long_text = dialect.sql_type(ColumnType::Json);
    let boolean = dialect.sql_type(ColumnType::Boolean);

    let tables: Vec<(&str, String, Vec<String>)> = vec![
        (
            "moon_users",
            format!(
                "CREATE TABLE moon_users (\
                 pkid {pk}, \
                 id {text} NOT NULL, \
                 username {text} NOT NULL, \
                 email {text} NOT NULL, \
                 password_hash {text} NOT NULL, \
                 role {text} NOT NULL, \
                 can_write {boolean} NOT NULL, \
                 created_at {text} NOT NULL, \
                 updated_at {text} NOT NULL, \
                 last_login_at {text})"
            ),
            vec![
                "CREATE UNIQUE INDEX ux_moon_users_id ON moon_users (id)".to_string(),
                "CREATE UNIQUE INDEX ux_moon_users_username ON moon_users (username)".to_string(),
                "CREATE UNIQUE INDEX ux_moon_users_email ON moon_users (email)".to_string(),
            ],
        ),
        (
            "moon_refresh_tokens",
            format!(
                "CREATE TABLE moon_refresh_tokens (\
                 pkid {pk}, \
                 user_pkid BIGINT NOT NULL, \
                 token_hash {text} NOT NULL, \
                 expires_at {text} NOT NULL, \
                 created_at {text} NOT NULL, \
                 last_used_at {text}, \
                 FOREIGN KEY (user_pkid) REFERENCES moon_users (pkid) ON DELETE CASCADE)"
            ),
            vec![
                "CREATE UNIQUE INDEX ux_moon_refresh_tokens_hash ON moon_refresh_tokens (token_hash)"
                    .to_string(),
                "CREATE INDEX ix_moon_refresh_tokens_expires ON moon_refresh_tokens (expires_at)"
                    .to_string(),
                "CREATE INDEX ix_moon_refresh_tokens_user ON moon_refresh_tokens (user_pkid)"
                    .to_string(),
            ],
        ),
        (
            "moon_apikeys",
            format!(
                "CREATE TABLE moon_apikeys (\
                 pkid {pk}, \
                 id {text} NOT NULL, \
                 name {text} NOT NULL, \
                 description {long_text}, \
                 key_hash {text} NOT NULL, \
                 role {text} NOT NULL, \
                 can_write {boolean} NOT NULL, \
                 created_at {text} NOT NULL, \
                 last_used_at {text})"
            ),
            vec![
                "CREATE UNIQUE INDEX ux_moon_apikeys_id ON moon_apikeys (id)".to_string(),
                "CREATE UNIQUE INDEX ux_moon_apikeys_name ON moon_apikeys (name)".to_string(),
                "CREATE UNIQUE INDEX ux_moon_apikeys_hash ON moon_apikeys (key_hash)".to_string(),
            ],
        ),
        (
            "moon_token_blacklist",
            format!(
                "CREATE TABLE moon_token_blacklist (\
                 pkid {pk}, \
                 token_hash {text} NOT NULL, \
                 expires_at {text} NOT NULL, \
                 created_at {text} NOT NULL)"
            ),
            vec![
                "CREATE UNIQUE INDEX ux_moon_blacklist_hash ON moon_token_blacklist (token_hash)"
                    .to_string(),
                "CREATE INDEX ix_moon_blacklist_expires ON moon_token_blacklist (expires_at)"
                    .to_string(),
            ],
        ),
        (
            "moon_collections",
            format!(
                "CREATE TABLE moon_collections (\
                 pkid {pk}, \
                 name {text} NOT NULL, \
                 columns {long_text} NOT NULL, \
                 created_at {text} NOT NULL, \
                 updated_at {text} NOT NULL)"
            ),
            vec![
                "CREATE UNIQUE INDEX ux_moon_collections_name ON moon_collections (name)"
                    .to_string(),
            ],
        ),
    ];

    for (name, create_sql, index_sqls) in tables {
        if db.table_exists(name).await? {
            continue;
        }

        db.execute(&create_sql, &[]).await?;
        for index_sql in &index_sqls {
            db.execute(index_sql, &[]).await?;
        }
        info!(table = name, "Created system table");
    }

    Ok(())
}
