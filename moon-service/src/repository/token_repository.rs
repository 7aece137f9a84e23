//! # Token Repository
//!
//! Data access for refresh tokens (`moon_refresh_tokens`) and the access
//! token blacklist (`moon_token_blacklist`).
//!
//! ## Refresh Token Lifecycle
//!
//! ```text
//! ACTIVE ──(refresh)──► CONSUMED   row deleted + replacement inserted
//! ACTIVE ──(expiry)───► EXPIRED    row reaped by the purge job
//! ACTIVE ──(revoke)───► REVOKED    row deleted (logout / password change)
//! ```
//!
//! Consumption runs inside a transaction: the delete's affected-row count
//! decides the race - of two concurrent refreshes with the same token,
//! exactly one observes `1` and wins.
//!
//! ## Blacklist
//!
//! Access tokens cannot be un-issued, so revocation stores their SHA-256
//! hash with the original expiry. Entries past expiry are purged
//! periodically, which bounds the table at O(revocations per TTL window).

use chrono::{DateTime, Utc};
use shared::database::{bind_values, Db, SqlValue};
use shared::errors::ApiResult;
use sqlx::{Any, Transaction};

use crate::domain::entities::{format_ts, RefreshToken};

#[derive(Debug, Clone)]
pub struct TokenRepository {
    db: Db,
}

impl TokenRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    // =========================================================================
    // REFRESH TOKENS
    // =========================================================================

    /// Stores a freshly issued refresh token hash.
    pub async fn insert_refresh(
        &self,
        user_pkid: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> ApiResult<()> {
        let d = self.db.dialect();
        let sql = format!(
            "INSERT INTO moon_refresh_tokens (user_pkid, token_hash, expires_at, created_at) \
             VALUES ({}, {}, {}, {})",
            d.placeholder(1),
            d.placeholder(2),
            d.placeholder(3),
            d.placeholder(4),
        );
        self.db
            .execute(
                &sql,
                &[
                    SqlValue::Int(user_pkid),
                    SqlValue::Text(token_hash.to_string()),
                    SqlValue::Text(format_ts(expires_at)),
                    SqlValue::Text(format_ts(Utc::now())),
                ],
            )
            .await?;
        Ok(())
    }

    /// Same as [`TokenRepository::insert_refresh`], on an open transaction
    /// (used by the rotation path so delete + insert commit together).
    pub async fn insert_refresh_in(
        &self,
        tx: &mut Transaction<'static, Any>,
        user_pkid: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> ApiResult<()> {
        let d = self.db.dialect();
        let sql = format!(
            "INSERT INTO moon_refresh_tokens (user_pkid, token_hash, expires_at, created_at) \
             VALUES ({}, {}, {}, {})",
            d.placeholder(1),
            d.placeholder(2),
            d.placeholder(3),
            d.placeholder(4),
        );
        bind_values(
            sqlx::query(&sql),
            &[
                SqlValue::Int(user_pkid),
                SqlValue::Text(token_hash.to_string()),
                SqlValue::Text(format_ts(expires_at)),
                SqlValue::Text(format_ts(Utc::now())),
            ],
        )
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Looks up a refresh token by hash inside a transaction.
    pub async fn find_by_hash_in(
        &self,
        tx: &mut Transaction<'static, Any>,
        token_hash: &str,
    ) -> ApiResult<Option<RefreshToken>> {
        let sql = format!(
            "SELECT * FROM moon_refresh_tokens WHERE token_hash = {}",
            self.db.dialect().placeholder(1)
        );
        let row = bind_values(sqlx::query(&sql), &[SqlValue::Text(token_hash.to_string())])
            .fetch_optional(&mut **tx)
            .await?;
        row.as_ref().map(RefreshToken::from_row).transpose()
    }

    /// Deletes a refresh token by hash; the affected-row count is the
    /// winner signal for concurrent consumption.
    pub async fn delete_by_hash_in(
        &self,
        tx: &mut Transaction<'static, Any>,
        token_hash: &str,
    ) -> ApiResult<u64> {
        let sql = format!(
            "DELETE FROM moon_refresh_tokens WHERE token_hash = {}",
            self.db.dialect().placeholder(1)
        );
        let result = bind_values(sqlx::query(&sql), &[SqlValue::Text(token_hash.to_string())])
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    /// Best-effort delete outside a transaction (logout).
    pub async fn delete_by_hash(&self, token_hash: &str) -> ApiResult<u64> {
        let sql = format!(
            "DELETE FROM moon_refresh_tokens WHERE token_hash = {}",
            self.db.dialect().placeholder(1)
        );
        self.db
            .execute(&sql, &[SqlValue::Text(token_hash.to_string())])
            .await
    }

    /// Revokes every session of a user in one statement.
    pub async fn delete_for_user(&self, user_pkid: i64) -> ApiResult<u64> {
        let sql = format!(
            "DELETE FROM moon_refresh_tokens WHERE user_pkid = {}",
            self.db.dialect().placeholder(1)
        );
        self.db.execute(&sql, &[SqlValue::Int(user_pkid)]).await
    }

    /// Same as [`TokenRepository::delete_for_user`], on an open transaction.
    pub async fn delete_for_user_in(
        &self,
        tx: &mut Transaction<'static, Any>,
        user_pkid: i64,
    ) -> ApiResult<u64> {
        let sql = format!(
            "DELETE FROM moon_refresh_tokens WHERE user_pkid = {}",
            self.db.dialect().placeholder(1)
        );
        let result = bind_values(sqlx::query(&sql), &[SqlValue::Int(user_pkid)])
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // BLACKLIST
    // =========================================================================

    /// Blacklists an access token hash until its natural expiry.
    ///
    /// Re-blacklisting the same token (double logout) is not an error.
    pub async fn blacklist(&self, token_hash: &str, expires_at: DateTime<Utc>) -> ApiResult<()> {
        if self.is_blacklisted(token_hash).await? {
            return Ok(());
        }
        let d = self.db.dialect();
        let sql = format!(
            "INSERT INTO moon_token_blacklist (token_hash, expires_at, created_at) \
             VALUES ({}, {}, {})",
            d.placeholder(1),
            d.placeholder(2),
            d.placeholder(3),
        );
        // A racing duplicate insert can still trip the unique index; that
        // outcome means the token is blacklisted, which is what we want.
        if let Err(shared::errors::ApiError::Database(e)) = self
            .db
            .execute(
                &sql,
                &[
                    SqlValue::Text(token_hash.to_string()),
                    SqlValue::Text(format_ts(expires_at)),
                    SqlValue::Text(format_ts(Utc::now())),
                ],
            )
            .await
        {
            if !shared::errors::is_unique_violation(&e) {
                return Err(shared::errors::ApiError::Database(e));
            }
        }
        Ok(())
    }

    /// Whether an access token hash has been revoked.
    pub async fn is_blacklisted(&self, token_hash: &str) -> ApiResult<bool> {
        let sql = format!(
            "SELECT pkid FROM moon_token_blacklist WHERE token_hash = {}",
            self.db.dialect().placeholder(1)
        );
        Ok(self
            .db
            .fetch_optional(&sql, &[SqlValue::Text(token_hash.to_string())])
            .await?
            .is_some())
    }

    // =========================================================================
    // PURGE
    // =========================================================================

    /// Drops expired refresh tokens and blacklist entries. RFC 3339 UTC
    /// strings compare correctly as text.
    pub async fn purge_expired(&self) -> ApiResult<u64> {
        let d = self.db.dialect();
        let now = format_ts(Utc::now());

        let sql = format!(
            "DELETE FROM moon_refresh_tokens WHERE expires_at < {}",
            d.placeholder(1)
        );
        let refresh = self
            .db
            .execute(&sql, &[SqlValue::Text(now.clone())])
            .await?;

        let sql = format!(
            "DELETE FROM moon_token_blacklist WHERE expires_at < {}",
            d.placeholder(1)
        );
        let blacklist = self.db.execute(&sql, &[SqlValue::Text(now)]).await?;

        Ok(refresh + blacklist)
    }
}
