//! # JWT Access Token Service
//!
//! Signing and verification of the short-lived access tokens (HS256).
//!
//! ## Token Model
//!
//! Moon uses an asymmetric pair of credential kinds:
//!
//! | Credential | Form | TTL | Revocable |
//! |------------|------|-----|-----------|
//! | Access token | JWT (this module) | 15 min default | via blacklist |
//! | Refresh token | opaque, DB-backed | 7 days default | single-use row |
//!
//! Access tokens are stateless except for the blacklist check, which the
//! auth pipeline performs against the token's SHA-256 hash after signature
//! verification succeeds.
//!
//! ## Claims
//!
//! | Claim | Content |
//! |-------|---------|
//! | `sub` | user ULID (same as `user_id`) |
//! | `user_id` | user ULID |
//! | `username` | login name |
//! | `email` | user email |
//! | `role` | `admin` or `user` |
//! | `can_write` | write permission flag |
//! | `iat` / `nbf` / `exp` | issued-at / not-before / expiry (Unix secs) |
//! | `iss` | configured issuer |
//!
//! ## Validation Steps
//!
//! 1. Signature (HS256, configured secret)
//! 2. `exp` and `nbf`
//! 3. `iss` matches configuration
//!
//! Any failure maps to the single client-visible message
//! `invalid or expired token`.

use crate::config::JwtConfig;
use crate::errors::ApiError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

// =============================================================================
// Claims
// =============================================================================

/// JWT claims (token payload). All fields are verified during validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - the user's ULID.
    pub sub: String,

    /// User ULID, duplicated from `sub` for client convenience.
    pub user_id: String,

    /// Login name.
    pub username: String,

    /// Email address.
    pub email: String,

    /// Role string (`admin` or `user`).
    pub role: String,

    /// Write permission flag.
    pub can_write: bool,

    /// Issued-at as Unix timestamp.
    pub iat: i64,

    /// Not-before as Unix timestamp.
    pub nbf: i64,

    /// Expiration as Unix timestamp.
    pub exp: i64,

    /// Issuer.
    pub iss: String,
}

// =============================================================================
// Service
// =============================================================================

/// Service for JWT generation and validation.
///
/// Created once at startup and shared via `Arc`; the keys are immutable
/// after construction.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    config: JwtConfig,
}

impl JwtService {
    /// Creates a new JWT service with the given configuration.
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            encoding_key,
            decoding_key,
            config,
        }
    }

    /// Access token TTL in seconds, for response metadata.
    pub fn access_expiry(&self) -> u64 {
        self.config.access_expiry
    }

    /// Generates an access token for a user.
    ///
    /// ## Errors
    ///
    /// Internal error if encoding fails (doesn't happen with a valid key).
    pub fn generate_access_token(
        &self,
        user_id: &str,
        username: &str,
        email: &str,
        role: &str,
        can_write: bool,
    ) -> Result<String, ApiError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.config.access_expiry as i64);

        let claims = Claims {
            sub: user_id.to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            can_write,
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            ApiError::internal(format!("Failed to generate token: {}", e))
        })
    }

    /// Validates a token's signature, expiry, not-before and issuer.
    ///
    /// Does NOT consult the blacklist - that requires a database lookup and
    /// belongs to the auth pipeline.
    ///
    /// ## Errors
    ///
    /// Every failure mode collapses to `ApiError::InvalidToken`; the client
    /// never learns which check failed.
    pub fn validate(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.validate_nbf = true;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| ApiError::InvalidToken)
    }
}

// Implement Debug manually to avoid exposing keys
impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("issuer", &self.config.issuer)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: "test_secret_key_minimum_32_chars_required".to_string(),
            access_expiry: 900,
            refresh_expiry: 604800,
            issuer: "moon".to_string(),
        }
    }

    fn generate(service: &JwtService) -> String {
        service
            .generate_access_token(
                "01ARZ3NDEKTSV4RRFFQ69G5FAV",
                "admin",
                "admin@example.com",
                "admin",
                true,
            )
            .unwrap()
    }

    #[test]
    fn test_generate_and_validate() {
        let service = JwtService::new(test_config());
        let token = generate(&service);

        let claims = service.validate(&token).unwrap();
        assert_eq!(claims.sub, "01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert_eq!(claims.user_id, claims.sub);
        assert_eq!(claims.username, "admin");
        assert_eq!(claims.role, "admin");
        assert!(claims.can_write);
        assert_eq!(claims.iss, "moon");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let service = JwtService::new(test_config());
        let token = generate(&service);

        // Flip one character in the payload section
        let mut chars: Vec<char> = token.chars().collect();
        let mid = token.len() / 2;
        chars[mid] = if chars[mid] == 'a' { 'b' } else { 'a' };
        let tampered: String = chars.into_iter().collect();

        assert!(matches!(service.validate(&tampered), Err(ApiError::InvalidToken)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let service = JwtService::new(test_config());
        let token = generate(&service);

        let other = JwtService::new(JwtConfig {
            secret: "another_secret_key_minimum_32_chars_long".to_string(),
            ..test_config()
        });

        assert!(matches!(other.validate(&token), Err(ApiError::InvalidToken)));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let mut config = test_config();
        config.issuer = "someone-else".to_string();
        let issuer = JwtService::new(config);
        let token = generate(&issuer);

        let validator = JwtService::new(test_config());
        assert!(matches!(validator.validate(&token), Err(ApiError::InvalidToken)));
    }

    #[test]
    fn test_garbage_rejected() {
        let service = JwtService::new(test_config());
        assert!(service.validate("not-a-jwt").is_err());
        assert!(service.validate("").is_err());
    }
}
