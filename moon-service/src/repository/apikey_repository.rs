//! # API Key Repository
//!
//! Data access for `moon_apikeys`. Keys are looked up by the SHA-256 hash
//! of the presented secret; the plaintext never reaches this layer.

use chrono::Utc;
use shared::database::{Db, SqlValue};
use shared::errors::{ApiError, ApiResult};

use crate::domain::entities::{format_ts, ApiKey};

#[derive(Debug, Clone)]
pub struct ApiKeyRepository {
    db: Db,
}

/// Fields for a new key row (hash precomputed by the service).
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub key_hash: String,
    pub role: shared::auth::Role,
    pub can_write: bool,
}

impl ApiKeyRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> ApiResult<Option<ApiKey>> {
        let sql = format!(
            "SELECT * FROM moon_apikeys WHERE id = {}",
            self.db.dialect().placeholder(1)
        );
        let row = self
            .db
            .fetch_optional(&sql, &[SqlValue::Text(id.to_string())])
            .await?;
        row.as_ref().map(ApiKey::from_row).transpose()
    }

    /// The auth-path lookup: by hash of the presented secret.
    pub async fn find_by_hash(&self, key_hash: &str) -> ApiResult<Option<ApiKey>> {
        let sql = format!(
            "SELECT * FROM moon_apikeys WHERE key_hash = {}",
            self.db.dialect().placeholder(1)
        );
        let row = self
            .db
            .fetch_optional(&sql, &[SqlValue::Text(key_hash.to_string())])
            .await?;
        row.as_ref().map(ApiKey::from_row).transpose()
    }

    pub async fn find_by_name(&self, name: &str) -> ApiResult<Option<ApiKey>> {
        let sql = format!(
            "SELECT * FROM moon_apikeys WHERE name = {}",
            self.db.dialect().placeholder(1)
        );
        let row = self
            .db
            .fetch_optional(&sql, &[SqlValue::Text(name.to_string())])
            .await?;
        row.as_ref().map(ApiKey::from_row).transpose()
    }

    pub async fn list(&self) -> ApiResult<Vec<ApiKey>> {
        let rows = self
            .db
            .fetch_all("SELECT * FROM moon_apikeys ORDER BY id ASC", &[])
            .await?;
        rows.iter().map(ApiKey::from_row).collect()
    }

    pub async fn insert(&self, new_key: NewApiKey) -> ApiResult<ApiKey> {
        let d = self.db.dialect();
        let sql = format!(
            "INSERT INTO moon_apikeys \
             (id, name, description, key_hash, role, can_write, created_at) \
             VALUES ({}, {}, {}, {}, {}, {}, {})",
            d.placeholder(1),
            d.placeholder(2),
            d.placeholder(3),
            d.placeholder(4),
            d.placeholder(5),
            d.placeholder(6),
            d.placeholder(7),
        );
        let args = vec![
            SqlValue::Text(new_key.id.clone()),
            SqlValue::Text(new_key.name.clone()),
            match &new_key.description {
                Some(desc) => SqlValue::Text(desc.clone()),
                None => SqlValue::Null,
            },
            SqlValue::Text(new_key.key_hash.clone()),
            SqlValue::Text(new_key.role.as_str().to_string()),
            SqlValue::Bool(new_key.can_write),
            SqlValue::Text(format_ts(Utc::now())),
        ];

        self.db.execute(&sql, &args).await.map_err(|e| match e {
            ApiError::Database(db_err) => {
                ApiError::from_db_conflict(db_err, "API key name already exists")
            }
            other => other,
        })?;

        self.find_by_id(&new_key.id)
            .await?
            .ok_or_else(|| ApiError::internal("inserted API key row not found"))
    }

    /// Persists the mutable fields, including a rotated `key_hash`.
    pub async fn update(&self, key: &ApiKey) -> ApiResult<()> {
        let d = self.db.dialect();
        let sql = format!(
            "UPDATE moon_apikeys SET name = {}, description = {}, key_hash = {}, \
             role = {}, can_write = {} WHERE pkid = {}",
            d.placeholder(1),
            d.placeholder(2),
            d.placeholder(3),
            d.placeholder(4),
            d.placeholder(5),
            d.placeholder(6),
        );
        let args = vec![
            SqlValue::Text(key.name.clone()),
            match &key.description {
                Some(desc) => SqlValue::Text(desc.clone()),
                None => SqlValue::Null,
            },
            SqlValue::Text(key.key_hash.clone()),
            SqlValue::Text(key.role.as_str().to_string()),
            SqlValue::Bool(key.can_write),
            SqlValue::Int(key.pkid),
        ];

        self.db.execute(&sql, &args).await.map_err(|e| match e {
            ApiError::Database(db_err) => {
                ApiError::from_db_conflict(db_err, "API key name already exists")
            }
            other => other,
        })?;
        Ok(())
    }

    pub async fn delete(&self, pkid: i64) -> ApiResult<u64> {
        let sql = format!(
            "DELETE FROM moon_apikeys WHERE pkid = {}",
            self.db.dialect().placeholder(1)
        );
        self.db.execute(&sql, &[SqlValue::Int(pkid)]).await
    }

    /// Best-effort usage stamp on successful authentication; a failure here
    /// must not fail the request.
    pub async fn touch_last_used(&self, pkid: i64) {
        let d = self.db.dialect();
        let sql = format!(
            "UPDATE moon_apikeys SET last_used_at = {} WHERE pkid = {}",
            d.placeholder(1),
            d.placeholder(2)
        );
        if let Err(e) = self
            .db
            .execute(
                &sql,
                &[SqlValue::Text(format_ts(Utc::now())), SqlValue::Int(pkid)],
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to stamp API key usage");
        }
    }
}
