//! # Data Transfer Objects
//!
//! Request and response shapes for the HTTP API.
//!
//! ## Response Envelopes
//!
//! | Shape | Used by |
//! |-------|---------|
//! | `{"data": …}` | single resources |
//! | `{"data": […], "meta": {count, limit, next, prev, total}}` | collection reads |
//! | `{"data": […], "meta": {total, succeeded, failed}, "message", "warning"?}` | batch writes |
//! | `{"message": …}` | errors and acknowledgements |
//!
//! ## Naming Convention
//!
//! - `*Request` - incoming data, validated with the `validator` derive
//! - `*Dto` - outgoing projections (never expose `pkid` or hashes)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::domain::entities::{ApiKey, User};
use crate::domain::schema::{Collection, Column};
use crate::service::data_service::{BatchOutcome, ListOutcome};

// =============================================================================
// GENERIC ENVELOPES
// =============================================================================

/// Request envelope: most write endpoints carry `{"data": …}`.
#[derive(Debug, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// Response envelope for a single resource.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Acknowledgement without a resource.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// =============================================================================
// LIST & BATCH ENVELOPES
// =============================================================================

/// Pagination metadata for collection reads.
#[derive(Debug, Serialize)]
pub struct ListMeta {
    /// Rows in this page
    pub count: usize,
    /// Effective page size
    pub limit: u32,
    /// Cursor for the next page, or null on the last page
    pub next: Option<String>,
    /// Cursor for the previous page; null when the prior page is page 1
    pub prev: Option<String>,
    /// COUNT under the same filters/search (0 if the count failed)
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub data: Vec<Map<String, Value>>,
    pub meta: ListMeta,
}

impl From<ListOutcome> for ListResponse {
    fn from(outcome: ListOutcome) -> Self {
        Self {
            meta: ListMeta {
                count: outcome.data.len(),
                limit: outcome.limit,
                next: outcome.next,
                prev: outcome.prev,
                total: outcome.total,
            },
            data: outcome.data,
        }
    }
}

/// Batch write accounting; `succeeded + failed == total` always holds.
#[derive(Debug, Serialize)]
pub struct BatchMeta {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub data: Vec<Map<String, Value>>,
    pub meta: BatchMeta,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl BatchResponse {
    /// Builds the response with the standard "N of M" message.
    pub fn from_outcome(outcome: BatchOutcome, verb: &str) -> Self {
        Self {
            message: format!(
                "{} {} of {} records",
                verb, outcome.succeeded, outcome.total
            ),
            meta: BatchMeta {
                total: outcome.total,
                succeeded: outcome.succeeded,
                failed: outcome.failed,
            },
            data: outcome.data,
            warning: None,
        }
    }
}

// =============================================================================
// HEALTH
// =============================================================================

/// Frozen health probe shape.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub name: String,
    /// `ok`, or `degraded` while the consistency check failed or timed out
    pub status: String,
    pub version: String,
}

// =============================================================================
// AUTH
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "refresh_token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "current_password is required"))]
    pub current_password: String,
    #[validate(length(min = 1, message = "new_password is required"))]
    pub new_password: String,
}

/// Login/refresh response payload.
#[derive(Debug, Serialize)]
pub struct TokenDto {
    pub token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: u64,
    pub user: UserDto,
}

// =============================================================================
// USERS
// =============================================================================

/// Public projection of a user; `pkid` and the password hash never leave
/// the process.
#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub can_write: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role.as_str().to_string(),
            can_write: user.can_write,
            created_at: user.created_at,
            updated_at: user.updated_at,
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50, message = "username must be between 3 and 50 characters"))]
    pub username: String,
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub can_write: Option<bool>,
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub can_write: Option<bool>,
    #[serde(default)]
    pub action: Option<String>,
}

// =============================================================================
// API KEYS
// =============================================================================

/// Public projection of an API key; the hash never leaves the process and
/// the plaintext appears only in [`ApiKeyCreatedDto`].
#[derive(Debug, Serialize)]
pub struct ApiKeyDto {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub role: String,
    pub can_write: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<ApiKey> for ApiKeyDto {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name,
            description: key.description,
            role: key.role.as_str().to_string(),
            can_write: key.can_write,
            created_at: key.created_at,
            last_used_at: key.last_used_at,
        }
    }
}

/// Key projection plus the one-time plaintext secret.
#[derive(Debug, Serialize)]
pub struct ApiKeyCreatedDto {
    #[serde(flatten)]
    pub info: ApiKeyDto,
    /// The full `moon_live_…` secret; shown exactly once
    pub key: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 3, max = 100, message = "API key name must be between 3 and 100 characters"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub can_write: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateApiKeyRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub can_write: Option<bool>,
    #[serde(default)]
    pub action: Option<String>,
}

// =============================================================================
// COLLECTIONS
// =============================================================================

/// `collections:create` body; deserializes straight into the domain shape.
pub type CreateCollectionRequest = Collection;

#[derive(Debug, Deserialize)]
pub struct UpdateCollectionRequest {
    pub columns: Vec<Column>,
}

/// `/{C}:schema` payload: user columns only, system columns filtered.
#[derive(Debug, Serialize)]
pub struct SchemaDto {
    pub collection: String,
    pub fields: Vec<Column>,
    pub total: usize,
}

impl From<Collection> for SchemaDto {
    fn from(collection: Collection) -> Self {
        Self {
            collection: collection.name,
            total: collection.columns.len(),
            fields: collection.columns,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_response_message() {
        let outcome = BatchOutcome {
            data: vec![],
            total: 3,
            succeeded: 2,
            failed: 1,
        };
        let response = BatchResponse::from_outcome(outcome, "created");
        assert_eq!(response.message, "created 2 of 3 records");
        assert_eq!(response.meta.total, 3);
        assert_eq!(response.meta.succeeded + response.meta.failed, 3);
    }

    #[test]
    fn test_batch_response_warning_is_omitted_when_absent() {
        let outcome = BatchOutcome {
            data: vec![],
            total: 1,
            succeeded: 1,
            failed: 0,
        };
        let response = BatchResponse::from_outcome(outcome, "created");
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("warning").is_none());
    }

    #[test]
    fn test_login_request_validation() {
        let ok: LoginRequest =
            serde_json::from_value(json!({"username": "admin", "password": "x"})).unwrap();
        assert!(ok.validate().is_ok());

        let missing: LoginRequest =
            serde_json::from_value(json!({"username": "", "password": "x"})).unwrap();
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_create_user_request_email_message() {
        let req: CreateUserRequest = serde_json::from_value(json!({
            "username": "u123",
            "email": "not-an-email",
            "password": "Pass123#",
            "role": "user"
        }))
        .unwrap();
        let err = shared::errors::ApiError::from(req.validate().unwrap_err());
        assert_eq!(err.to_string(), "invalid email format");
    }

    #[test]
    fn test_apikey_created_dto_flattens() {
        let dto = ApiKeyCreatedDto {
            info: ApiKeyDto {
                id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
                name: "ci".to_string() + "-bot",
                description: None,
                role: "user".to_string(),
                can_write: true,
                created_at: Utc::now(),
                last_used_at: None,
            },
            key: "moon_live_secret".to_string(),
        };
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["key"], "moon_live_secret");
        assert_eq!(json["name"], "ci-bot");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_schema_dto_shape() {
        let collection = Collection {
            name: "products".to_string(),
            columns: vec![Column {
                name: "title".to_string(),
                column_type: shared::database::ColumnType::String,
                nullable: false,
                default_value: None,
                unique: false,
            }],
        };
        let dto = SchemaDto::from(collection);
        assert_eq!(dto.collection, "products");
        assert_eq!(dto.total, 1);
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["fields"][0]["type"], "string");
    }
}
