//! # Principal Model & Authorization Gates
//!
//! The authenticated actor carried in request context, its extractor, and
//! the role/write gates applied per route.
//!
//! ## Authentication Flow
//!
//! ```text
//! ┌─────────┐   ┌───────────────┐   ┌──────────────────┐   ┌──────────┐
//! │ Request │──►│ Bearer parse  │──►│ JWT or API-key   │──►│ Principal│
//! └─────────┘   │ (this module) │   │ validation       │   │ in exts  │
//!               └───────────────┘   │ (service layer)  │   └────┬─────┘
//!                                   └──────────────────┘        │
//!                                   ┌──────────────────┐        │
//!                                   │     Handler      │◄───────┘
//!                                   │   (Principal)    │
//!                                   └──────────────────┘
//! ```
//!
//! The credential validation itself needs database access (blacklist,
//! API-key lookup) and lives in the service crate; this module owns the
//! types and the pure parts.
//!
//! ## Authorization Model
//!
//! | Gate | Passes when |
//! |------|-------------|
//! | authenticated | a principal is attached |
//! | admin | `role == admin` |
//! | write | `role == admin` OR `can_write` |
//!
//! All gate failures surface as 401 - the API deliberately has no 403.

use crate::errors::ApiError;
use actix_web::{Error, HttpMessage};
use serde::{Deserialize, Serialize};

// =============================================================================
// Roles
// =============================================================================

/// System roles.
///
/// The wire format knows `admin` and `user`; the legacy value `readonly`
/// is accepted on input and collapses to `user` without write permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    /// Parses a role from its wire name. `readonly` maps to [`Role::User`];
    /// callers that accept it must also force `can_write = false` via
    /// [`Role::parse_with_write`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "user" | "readonly" => Some(Self::User),
            _ => None,
        }
    }

    /// Parses a role together with the effective write flag.
    ///
    /// `readonly` forces the flag off; `admin` is write-capable by
    /// definition regardless of the stored flag.
    pub fn parse_with_write(s: &str, can_write: bool) -> Option<(Self, bool)> {
        match s {
            "admin" => Some((Self::Admin, true)),
            "user" => Some((Self::User, can_write)),
            "readonly" => Some((Self::User, false)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

// =============================================================================
// Principal
// =============================================================================

/// What kind of credential authenticated this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalType {
    User,
    ApiKey,
}

impl PrincipalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::ApiKey => "apikey",
        }
    }
}

/// The authenticated actor attached to request extensions.
#[derive(Debug, Clone)]
pub struct Principal {
    /// ULID of the user or API key
    pub id: String,
    /// Credential kind
    pub principal_type: PrincipalType,
    /// Login name (users only)
    pub username: Option<String>,
    /// Role for authorization decisions
    pub role: Role,
    /// Write permission flag as stored; use [`Principal::has_write`]
    pub can_write: bool,
}

impl Principal {
    /// Whether this principal holds the admin role.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Effective write capability: admins write regardless of the flag.
    pub fn has_write(&self) -> bool {
        self.is_admin() || self.can_write
    }

    /// Admin gate. Fails with 401 (the API has no 403).
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::AuthenticationRequired)
        }
    }

    /// Role gate: admin always passes, otherwise the role must match.
    pub fn require_role(&self, role: Role) -> Result<(), ApiError> {
        if self.is_admin() || self.role == role {
            Ok(())
        } else {
            Err(ApiError::AuthenticationRequired)
        }
    }

    /// Write gate: admin passes, otherwise `can_write` must be set.
    pub fn require_write(&self) -> Result<(), ApiError> {
        if self.has_write() {
            Ok(())
        } else {
            Err(ApiError::AuthenticationRequired)
        }
    }
}

// =============================================================================
// Bearer Parsing
// =============================================================================

/// Extracts the credential from an `Authorization` header value.
///
/// The scheme is matched case-insensitively (`Bearer`, `bearer`, …);
/// anything else is treated as absent credentials.
pub fn extract_bearer(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

// =============================================================================
// Actix-web Extractor
// =============================================================================

/// Extractor for the authenticated principal in handlers.
///
/// The auth middleware inserts the [`Principal`] into request extensions;
/// handlers simply declare it as a parameter.
///
/// ## Errors
///
/// 401 `authentication required` if no principal is attached (public route
/// or middleware not applied).
impl actix_web::FromRequest for Principal {
    type Error = Error;
    type Future = std::future::Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        let result = req
            .extensions()
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| ApiError::AuthenticationRequired.into());

        std::future::ready(result)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role, can_write: bool) -> Principal {
        Principal {
            id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
            principal_type: PrincipalType::User,
            username: Some("alice".to_string()),
            role,
            can_write,
        }
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("readonly"), Some(Role::User));
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn test_readonly_collapses_to_user_without_write() {
        assert_eq!(Role::parse_with_write("readonly", true), Some((Role::User, false)));
        assert_eq!(Role::parse_with_write("user", true), Some((Role::User, true)));
        assert_eq!(Role::parse_with_write("admin", false), Some((Role::Admin, true)));
    }

    #[test]
    fn test_admin_passes_all_gates() {
        let p = principal(Role::Admin, false);
        assert!(p.require_admin().is_ok());
        assert!(p.require_write().is_ok());
        assert!(p.require_role(Role::User).is_ok());
        assert!(p.has_write());
    }

    #[test]
    fn test_user_gates() {
        let writer = principal(Role::User, true);
        assert!(writer.require_admin().is_err());
        assert!(writer.require_write().is_ok());

        let reader = principal(Role::User, false);
        assert!(reader.require_write().is_err());
        assert!(reader.require_role(Role::User).is_ok());
    }

    #[test]
    fn test_gate_failures_are_401() {
        let p = principal(Role::User, false);
        let err = p.require_admin().unwrap_err();
        assert_eq!(err.status_code(), actix_web::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer("bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer("BEARER abc123"), Some("abc123"));
        assert_eq!(extract_bearer("Basic abc123"), None);
        assert_eq!(extract_bearer("Bearer "), None);
        assert_eq!(extract_bearer("Bearer"), None);
    }
}
