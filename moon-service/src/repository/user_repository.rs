//! # User Repository
//!
//! Data access for `moon_users`.
//!
//! ## Query Patterns
//!
//! - Always parameterized; placeholders come from the dialect adapter
//!   (`?` vs `$n`), never string interpolation of values.
//! - Inserts are followed by a lookup on the ULID instead of relying on
//!   `RETURNING`, which only PostgreSQL supports.
//! - The admin-count guard queries ship in `_in` variants that run on an
//!   open transaction, so "count admins, then mutate" is atomic.

use chrono::Utc;
use shared::database::{bind_values, Db, SqlValue};
use shared::errors::{ApiError, ApiResult};
use sqlx::{Any, Transaction};

use crate::domain::entities::{format_ts, NewUser, User};

/// Repository for user rows.
///
/// `Clone` is cheap: the pool inside [`Db`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct UserRepository {
    db: Db,
}

impl UserRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    // =========================================================================
    // LOOKUPS
    // =========================================================================

    /// Total number of users. Zero means the system is un-bootstrapped.
    pub async fn count(&self) -> ApiResult<i64> {
        let row = self
            .db
            .fetch_optional("SELECT COUNT(*) AS value FROM moon_users", &[])
            .await?;
        let count = match row {
            Some(row) => sqlx::Row::try_get::<i64, _>(&row, 0)?,
            None => 0,
        };
        Ok(count)
    }

    pub async fn find_by_id(&self, id: &str) -> ApiResult<Option<User>> {
        let sql = format!(
            "SELECT * FROM moon_users WHERE id = {}",
            self.db.dialect().placeholder(1)
        );
        let row = self
            .db
            .fetch_optional(&sql, &[SqlValue::Text(id.to_string())])
            .await?;
        row.as_ref().map(User::from_row).transpose()
    }

    pub async fn find_by_pkid(&self, pkid: i64) -> ApiResult<Option<User>> {
        let sql = format!(
            "SELECT * FROM moon_users WHERE pkid = {}",
            self.db.dialect().placeholder(1)
        );
        let row = self.db.fetch_optional(&sql, &[SqlValue::Int(pkid)]).await?;
        row.as_ref().map(User::from_row).transpose()
    }

    /// Case-sensitive username lookup.
    pub async fn find_by_username(&self, username: &str) -> ApiResult<Option<User>> {
        let sql = format!(
            "SELECT * FROM moon_users WHERE username = {}",
            self.db.dialect().placeholder(1)
        );
        let row = self
            .db
            .fetch_optional(&sql, &[SqlValue::Text(username.to_string())])
            .await?;
        row.as_ref().map(User::from_row).transpose()
    }

    /// Case-sensitive email lookup.
    pub async fn find_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let sql = format!(
            "SELECT * FROM moon_users WHERE email = {}",
            self.db.dialect().placeholder(1)
        );
        let row = self
            .db
            .fetch_optional(&sql, &[SqlValue::Text(email.to_string())])
            .await?;
        row.as_ref().map(User::from_row).transpose()
    }

    /// All users in ULID (creation) order.
    pub async fn list(&self) -> ApiResult<Vec<User>> {
        let rows = self
            .db
            .fetch_all("SELECT * FROM moon_users ORDER BY id ASC", &[])
            .await?;
        rows.iter().map(User::from_row).collect()
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Inserts a user and returns the stored row.
    ///
    /// Uniqueness is pre-checked by the service for precise messages; a
    /// racing duplicate still maps to 409 here.
    pub async fn insert(&self, new_user: NewUser) -> ApiResult<User> {
        let d = self.db.dialect();
        let now = format_ts(Utc::now());
        let sql = format!(
            "INSERT INTO moon_users \
             (id, username, email, password_hash, role, can_write, created_at, updated_at) \
             VALUES ({}, {}, {}, {}, {}, {}, {}, {})",
            d.placeholder(1),
            d.placeholder(2),
            d.placeholder(3),
            d.placeholder(4),
            d.placeholder(5),
            d.placeholder(6),
            d.placeholder(7),
            d.placeholder(8),
        );
        let args = vec![
            SqlValue::Text(new_user.id.clone()),
            SqlValue::Text(new_user.username.clone()),
            SqlValue::Text(new_user.email.clone()),
            SqlValue::Text(new_user.password_hash.clone()),
            SqlValue::Text(new_user.role.as_str().to_string()),
            SqlValue::Bool(new_user.can_write),
            SqlValue::Text(now.clone()),
            SqlValue::Text(now),
        ];

        self.db.execute(&sql, &args).await.map_err(|e| match e {
            ApiError::Database(db_err) => {
                ApiError::from_db_conflict(db_err, "username or email already exists")
            }
            other => other,
        })?;

        self.find_by_id(&new_user.id)
            .await?
            .ok_or_else(|| ApiError::internal("inserted user row not found"))
    }

    /// Persists the mutable fields of a user row.
    pub async fn update(&self, user: &User) -> ApiResult<()> {
        let (sql, args) = Self::update_statement(&self.db, user);
        self.db.execute(&sql, &args).await.map_err(|e| match e {
            ApiError::Database(db_err) => {
                ApiError::from_db_conflict(db_err, "username or email already exists")
            }
            other => other,
        })?;
        Ok(())
    }

    /// Same as [`UserRepository::update`], on an open transaction.
    pub async fn update_in(
        &self,
        tx: &mut Transaction<'static, Any>,
        user: &User,
    ) -> ApiResult<()> {
        let (sql, args) = Self::update_statement(&self.db, user);
        bind_values(sqlx::query(&sql), &args)
            .execute(&mut **tx)
            .await
            .map_err(|e| ApiError::from_db_conflict(e, "username or email already exists"))?;
        Ok(())
    }

    fn update_statement(db: &Db, user: &User) -> (String, Vec<SqlValue>) {
        let d = db.dialect();
        let sql = format!(
            "UPDATE moon_users SET username = {}, email = {}, password_hash = {}, \
             role = {}, can_write = {}, updated_at = {}, last_login_at = {} WHERE pkid = {}",
            d.placeholder(1),
            d.placeholder(2),
            d.placeholder(3),
            d.placeholder(4),
            d.placeholder(5),
            d.placeholder(6),
            d.placeholder(7),
            d.placeholder(8),
        );
        let args = vec![
            SqlValue::Text(user.username.clone()),
            SqlValue::Text(user.email.clone()),
            SqlValue::Text(user.password_hash.clone()),
            SqlValue::Text(user.role.as_str().to_string()),
            SqlValue::Bool(user.can_write),
            SqlValue::Text(format_ts(Utc::now())),
            match &user.last_login_at {
                Some(ts) => SqlValue::Text(format_ts(*ts)),
                None => SqlValue::Null,
            },
            SqlValue::Int(user.pkid),
        ];
        (sql, args)
    }

    /// Stamps a successful login.
    pub async fn update_last_login(&self, pkid: i64) -> ApiResult<()> {
        let d = self.db.dialect();
        let sql = format!(
            "UPDATE moon_users SET last_login_at = {} WHERE pkid = {}",
            d.placeholder(1),
            d.placeholder(2)
        );
        self.db
            .execute(
                &sql,
                &[SqlValue::Text(format_ts(Utc::now())), SqlValue::Int(pkid)],
            )
            .await?;
        Ok(())
    }

    /// Deletes a user row. Refresh tokens cascade at the SQL level and are
    /// additionally deleted explicitly by the service, since SQLite does
    /// not enforce foreign keys on every connection.
    pub async fn delete_in(
        &self,
        tx: &mut Transaction<'static, Any>,
        pkid: i64,
    ) -> ApiResult<u64> {
        let sql = format!(
            "DELETE FROM moon_users WHERE pkid = {}",
            self.db.dialect().placeholder(1)
        );
        let result = bind_values(sqlx::query(&sql), &[SqlValue::Int(pkid)])
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // GUARD QUERIES
    // =========================================================================

    /// Number of admin users, counted inside the caller's transaction so a
    /// concurrent demotion cannot slip past the last-admin guard.
    pub async fn count_admins_in(&self, tx: &mut Transaction<'static, Any>) -> ApiResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS value FROM moon_users WHERE role = {}",
            self.db.dialect().placeholder(1)
        );
        let row = bind_values(sqlx::query(&sql), &[SqlValue::Text("admin".to_string())])
            .fetch_one(&mut **tx)
            .await?;
        Ok(sqlx::Row::try_get::<i64, _>(&row, 0)?)
    }
}
