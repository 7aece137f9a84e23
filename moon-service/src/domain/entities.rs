//! # Principal Domain Entities
//!
//! Persistent business objects for authentication and authorization. These
//! map to the `moon_*` system tables.
//!
//! ## Entity Overview
//!
//! ```text
//! ┌──────────────────────┐          ┌──────────────────────────┐
//! │         User         │          │       RefreshToken       │
//! ├──────────────────────┤   1:N    ├──────────────────────────┤
//! │ - pkid (internal PK) │─────────▶│ - user_pkid (FK CASCADE) │
//! │ - id (ULID)          │          │ - token_hash (SHA-256)   │
//! │ - username / email   │          │ - expires_at             │
//! │ - password_hash      │          │ - last_used_at           │
//! │ - role / can_write   │          └──────────────────────────┘
//! └──────────────────────┘
//!
//! ┌──────────────────────┐          ┌──────────────────────────┐
//! │        ApiKey        │          │   moon_token_blacklist   │
//! ├──────────────────────┤          ├──────────────────────────┤
//! │ - id (ULID)          │          │ - token_hash (SHA-256)   │
//! │ - name (unique)      │          │ - expires_at             │
//! │ - key_hash (SHA-256) │          └──────────────────────────┘
//! │ - role / can_write   │
//! └──────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! - **`pkid` and `password_hash` never leave the process** - API responses
//!   are built from projection DTOs, not these structs.
//! - Refresh tokens and API keys exist only as SHA-256 digests; the
//!   plaintext is shown once at issue time.
//!
//! ## Timestamp Encoding
//!
//! All timestamps are stored as RFC 3339 text in every dialect (the Any
//! driver has no native datetime codec) and parsed into `DateTime<Utc>`
//! here, at the decode boundary.

use chrono::{DateTime, Utc};
use shared::auth::Role;
use shared::errors::{ApiError, ApiResult};
use sqlx::any::AnyRow;
use sqlx::Row;

// =============================================================================
// Timestamp Helpers
// =============================================================================

/// Canonical storage form of a timestamp.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parses a stored timestamp; a malformed value is a data-corruption-level
/// internal error, never a client error.
pub fn parse_ts(raw: &str) -> ApiResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ApiError::internal(format!("malformed stored timestamp '{}': {}", raw, e)))
}

fn get_ts(row: &AnyRow, column: &str) -> ApiResult<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    parse_ts(&raw)
}

fn get_opt_ts(row: &AnyRow, column: &str) -> ApiResult<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.as_deref().map(parse_ts).transpose()
}

/// Booleans arrive as native bools (PostgreSQL) or integers (SQLite,
/// MySQL) depending on the backend.
fn get_bool(row: &AnyRow, column: &str) -> ApiResult<bool> {
    if let Ok(b) = row.try_get::<bool, _>(column) {
        return Ok(b);
    }
    let n: i64 = row.try_get(column)?;
    Ok(n != 0)
}

// =============================================================================
// USER
// =============================================================================

/// Complete user record as stored in `moon_users`.
///
/// Contains `pkid` and `password_hash`; never serialized to a response.
#[derive(Debug, Clone)]
pub struct User {
    /// Internal numeric key, never exposed
    pub pkid: i64,
    /// External ULID
    pub id: String,
    /// Unique login name (case-sensitive)
    pub username: String,
    /// Unique email (case-sensitive)
    pub email: String,
    /// bcrypt hash
    pub password_hash: String,
    /// `admin` or `user`
    pub role: Role,
    /// Write permission flag (admins write regardless)
    pub can_write: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Decodes a user from a `SELECT *`-shaped row.
    pub fn from_row(row: &AnyRow) -> ApiResult<Self> {
        let role_raw: String = row.try_get("role")?;
        let can_write = get_bool(row, "can_write")?;
        let (role, can_write) = Role::parse_with_write(&role_raw, can_write)
            .ok_or_else(|| ApiError::internal(format!("unknown stored role '{}'", role_raw)))?;

        Ok(Self {
            pkid: row.try_get("pkid")?,
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            role,
            can_write,
            created_at: get_ts(row, "created_at")?,
            updated_at: get_ts(row, "updated_at")?,
            last_login_at: get_opt_ts(row, "last_login_at")?,
        })
    }

    /// Effective write capability: admins write regardless of the flag.
    pub fn has_write(&self) -> bool {
        self.role == Role::Admin || self.can_write
    }
}

/// Data required to insert a user (password already hashed).
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub can_write: bool,
}

// =============================================================================
// REFRESH TOKEN
// =============================================================================

/// A stored refresh token row (`moon_refresh_tokens`).
///
/// Single-use: consumption deletes the row inside the same transaction
/// that issues the replacement pair.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub pkid: i64,
    /// Owning user, cascade on delete
    pub user_pkid: i64,
    /// SHA-256 hex of the opaque token
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    pub fn from_row(row: &AnyRow) -> ApiResult<Self> {
        Ok(Self {
            pkid: row.try_get("pkid")?,
            user_pkid: row.try_get("user_pkid")?,
            token_hash: row.try_get("token_hash")?,
            expires_at: get_ts(row, "expires_at")?,
            created_at: get_ts(row, "created_at")?,
            last_used_at: get_opt_ts(row, "last_used_at")?,
        })
    }

    /// Whether the token is still within its lifetime.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// =============================================================================
// API KEY
// =============================================================================

/// A stored API key (`moon_apikeys`). The plaintext secret is never stored.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub pkid: i64,
    /// External ULID
    pub id: String,
    /// Unique display name (3-100 chars)
    pub name: String,
    pub description: Option<String>,
    /// SHA-256 hex of the full `moon_live_…` secret
    pub key_hash: String,
    pub role: Role,
    pub can_write: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn from_row(row: &AnyRow) -> ApiResult<Self> {
        let role_raw: String = row.try_get("role")?;
        let can_write = get_bool(row, "can_write")?;
        let (role, can_write) = Role::parse_with_write(&role_raw, can_write)
            .ok_or_else(|| ApiError::internal(format!("unknown stored role '{}'", role_raw)))?;

        Ok(Self {
            pkid: row.try_get("pkid")?,
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            key_hash: row.try_get("key_hash")?,
            role,
            can_write,
            created_at: get_ts(row, "created_at")?,
            last_used_at: get_opt_ts(row, "last_used_at")?,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip() {
        let now = Utc::now();
        let parsed = parse_ts(&format_ts(now)).unwrap();
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_malformed_timestamp_is_internal_error() {
        let err = parse_ts("yesterday").unwrap_err();
        assert!(err.is_server_error());
    }

    #[test]
    fn test_refresh_token_activity_window() {
        let now = Utc::now();
        let token = RefreshToken {
            pkid: 1,
            user_pkid: 1,
            token_hash: "h".to_string(),
            expires_at: now + chrono::Duration::days(7),
            created_at: now,
            last_used_at: None,
        };
        assert!(token.is_active(now));
        assert!(!token.is_active(now + chrono::Duration::days(8)));
    }

    #[test]
    fn test_admin_writes_regardless_of_flag() {
        let user = User {
            pkid: 1,
            id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
            username: "root".to_string(),
            email: "root@example.com".to_string(),
            password_hash: "x".to_string(),
            role: Role::Admin,
            can_write: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        };
        assert!(user.has_write());
    }
}
