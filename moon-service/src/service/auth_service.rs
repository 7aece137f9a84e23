//! # Authentication Service
//!
//! Business logic for the credential lifecycle:
//!
//! - Login with per-(ip, username) attempt limiting
//! - Single-use refresh token rotation
//! - Logout and password change with session revocation
//! - The per-request authentication pipeline (JWT and API-key paths)
//! - Bootstrap of the first admin account
//!
//! ## Token Architecture
//!
//! ```text
//! ┌─────────────────┐                  ┌─────────────────────────┐
//! │  Access Token   │                  │     Refresh Token       │
//! │  (JWT, 15 min)  │                  │   (opaque, 7 days)      │
//! └────────┬────────┘                  └───────────┬─────────────┘
//!          │ stateless verification                │ stored hashed,
//!          │ + blacklist lookup                    │ single-use row
//!          ▼                                       ▼
//!   revocable via moon_token_blacklist      deleted on consumption;
//!                                           rotation issues a new pair
//! ```
//!
//! ## Refresh Race
//!
//! Two concurrent refreshes with the same token race to delete the same
//! row inside their transactions; the affected-row count picks exactly one
//! winner. The loser sees the row gone and gets the canonical
//! `invalid or expired token`.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{info, warn};

use shared::auth::apikey::{self, generate_refresh_token, hash_secret};
use shared::auth::{JwtService, PasswordHasher, PasswordPolicy, Principal, PrincipalType, Role};
use shared::config::AppConfig;
use shared::errors::{ApiError, ApiResult};
use shared::ulid::UlidService;
use shared::validation::is_valid_email;

use crate::domain::entities::{NewUser, User};
use crate::repository::{ApiKeyRepository, TokenRepository, UserRepository};
use crate::service::rate_limit::LoginLimiter;

/// Tokens and profile returned by login and refresh.
#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: User,
}

#[derive(Clone)]
pub struct AuthService {
    db: shared::database::Db,
    users: UserRepository,
    tokens: TokenRepository,
    apikeys: ApiKeyRepository,
    jwt: Arc<JwtService>,
    hasher: PasswordHasher,
    policy: PasswordPolicy,
    login_limiter: Arc<LoginLimiter>,
    ulid: Arc<UlidService>,
    refresh_expiry: u64,
    apikey_enabled: bool,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: shared::database::Db,
        users: UserRepository,
        tokens: TokenRepository,
        apikeys: ApiKeyRepository,
        jwt: Arc<JwtService>,
        login_limiter: Arc<LoginLimiter>,
        ulid: Arc<UlidService>,
        config: &AppConfig,
    ) -> Self {
        Self {
            db,
            users,
            tokens,
            apikeys,
            jwt,
            hasher: PasswordHasher::new(),
            policy: PasswordPolicy::default(),
            login_limiter,
            ulid,
            refresh_expiry: config.jwt.refresh_expiry,
            apikey_enabled: config.apikey.enabled,
        }
    }

    // =========================================================================
    // REQUEST AUTHENTICATION (C8 core)
    // =========================================================================

    /// Validates a presented bearer credential and builds the principal.
    ///
    /// Credential shape is detected by prefix: `moon_live_…` goes down the
    /// API-key path, everything else is treated as a JWT.
    pub async fn authenticate(&self, token: &str) -> ApiResult<Principal> {
        if apikey::is_api_key(token) {
            if !self.apikey_enabled {
                return Err(ApiError::InvalidToken);
            }
            let key = self
                .apikeys
                .find_by_hash(&hash_secret(token))
                .await?
                .ok_or(ApiError::InvalidToken)?;

            // Usage stamp is best-effort and must not fail the request
            self.apikeys.touch_last_used(key.pkid).await;

            Ok(Principal {
                id: key.id,
                principal_type: PrincipalType::ApiKey,
                username: None,
                role: key.role,
                can_write: key.can_write,
            })
        } else {
            let claims = self.jwt.validate(token)?;

            if self.tokens.is_blacklisted(&hash_secret(token)).await? {
                return Err(ApiError::InvalidToken);
            }

            let (role, can_write) = Role::parse_with_write(&claims.role, claims.can_write)
                .ok_or(ApiError::InvalidToken)?;

            Ok(Principal {
                id: claims.user_id,
                principal_type: PrincipalType::User,
                username: Some(claims.username),
                role,
                can_write,
            })
        }
    }

    // =========================================================================
    // LOGIN
    // =========================================================================

    /// Authenticates a user by username and password.
    ///
    /// The attempt is recorded against the (ip, username) window **before**
    /// credential verification, so failed guesses burn budget; a
    /// successful login resets the window.
    pub async fn login(&self, username: &str, password: &str, ip: &str) -> ApiResult<AuthTokens> {
        self.login_limiter.check_and_record(ip, username)?;

        let user = self
            .users
            .find_by_username(username)
            .await?
            .ok_or_else(|| {
                warn!(username = %username, "Login attempt for unknown username");
                ApiError::InvalidCredentials
            })?;

        if !self.hasher.verify(password, &user.password_hash)? {
            warn!(user_id = %user.id, "Failed login attempt");
            return Err(ApiError::InvalidCredentials);
        }

        self.login_limiter.reset_for_user(username);
        self.users.update_last_login(user.pkid).await?;

        info!(user_id = %user.id, username = %username, "User logged in");

        self.issue_tokens(user).await
    }

    // =========================================================================
    // REFRESH (single-use rotation)
    // =========================================================================

    /// Consumes a refresh token and issues a new pair.
    ///
    /// Lookup, expiry check, delete and replacement insert run in one
    /// transaction; the delete's affected-row count settles concurrent
    /// consumers.
    pub async fn refresh(&self, refresh_token: &str) -> ApiResult<AuthTokens> {
        let presented_hash = hash_secret(refresh_token);
        let new_token = generate_refresh_token();
        let new_hash = hash_secret(&new_token);
        let expires_at = Utc::now() + ChronoDuration::seconds(self.refresh_expiry as i64);

        let mut tx = self.db.begin().await?;

        let stored = self
            .tokens
            .find_by_hash_in(&mut tx, &presented_hash)
            .await?
            .ok_or(ApiError::InvalidToken)?;

        if !stored.is_active(Utc::now()) {
            return Err(ApiError::InvalidToken);
        }

        // Exactly one concurrent consumer observes 1 here
        if self
            .tokens
            .delete_by_hash_in(&mut tx, &presented_hash)
            .await?
            == 0
        {
            return Err(ApiError::InvalidToken);
        }

        self.tokens
            .insert_refresh_in(&mut tx, stored.user_pkid, &new_hash, expires_at)
            .await?;

        tx.commit().await?;

        let user = self
            .users
            .find_by_pkid(stored.user_pkid)
            .await?
            .ok_or(ApiError::InvalidToken)?;

        info!(user_id = %user.id, "Refresh token rotated");

        let access_token = self.access_token_for(&user)?;
        Ok(AuthTokens {
            access_token,
            refresh_token: new_token,
            expires_in: self.jwt.access_expiry(),
            user,
        })
    }

    // =========================================================================
    // LOGOUT & PASSWORD CHANGE
    // =========================================================================

    /// Revokes the current session: blacklists the presented access token
    /// until its natural expiry and deletes the presented refresh token.
    pub async fn logout(&self, access_token: &str, refresh_token: Option<&str>) -> ApiResult<()> {
        let claims = self.jwt.validate(access_token)?;
        let expires_at = chrono::DateTime::from_timestamp(claims.exp, 0)
            .unwrap_or_else(|| Utc::now() + ChronoDuration::seconds(self.jwt.access_expiry() as i64));

        self.tokens
            .blacklist(&hash_secret(access_token), expires_at)
            .await?;

        if let Some(refresh_token) = refresh_token {
            self.tokens
                .delete_by_hash(&hash_secret(refresh_token))
                .await?;
        }

        info!(user_id = %claims.user_id, "User logged out");
        Ok(())
    }

    /// Self-service password change. Verifies the current password,
    /// applies the strength policy, then revokes every session: all
    /// refresh tokens are deleted and the presented access token is
    /// blacklisted.
    pub async fn change_password(
        &self,
        principal: &Principal,
        current_password: &str,
        new_password: &str,
        access_token: &str,
    ) -> ApiResult<()> {
        let mut user = self
            .users
            .find_by_id(&principal.id)
            .await?
            .ok_or(ApiError::InvalidToken)?;

        if !self.hasher.verify(current_password, &user.password_hash)? {
            return Err(ApiError::InvalidCredentials);
        }

        self.policy.validate(new_password)?;
        user.password_hash = self.hasher.hash(new_password)?;
        self.users.update(&user).await?;

        let revoked = self.tokens.delete_for_user(user.pkid).await?;

        let claims = self.jwt.validate(access_token)?;
        let expires_at = chrono::DateTime::from_timestamp(claims.exp, 0)
            .unwrap_or_else(|| Utc::now() + ChronoDuration::seconds(self.jwt.access_expiry() as i64));
        self.tokens
            .blacklist(&hash_secret(access_token), expires_at)
            .await?;

        info!(user_id = %user.id, sessions_revoked = revoked, "Password changed");
        Ok(())
    }

    // =========================================================================
    // BOOTSTRAP
    // =========================================================================

    /// Creates the configured admin when the users table is empty. Never
    /// touches an already-populated system.
    pub async fn bootstrap_admin(&self, config: &AppConfig) -> ApiResult<()> {
        let Some(bootstrap) = &config.auth.bootstrap_admin else {
            return Ok(());
        };

        if self.users.count().await? > 0 {
            return Ok(());
        }

        if !is_valid_email(&bootstrap.email) {
            return Err(ApiError::validation("invalid email format"));
        }
        self.policy.validate(&bootstrap.password)?;

        let new_user = NewUser {
            id: self.ulid.generate(),
            username: bootstrap.username.clone(),
            email: bootstrap.email.clone(),
            password_hash: self.hasher.hash(&bootstrap.password)?,
            role: Role::Admin,
            can_write: true,
        };
        let user = self.users.insert(new_user).await?;

        info!(user_id = %user.id, username = %user.username, "Bootstrap admin created");
        Ok(())
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    /// Issues an access/refresh pair for a freshly authenticated user.
    async fn issue_tokens(&self, user: User) -> ApiResult<AuthTokens> {
        let access_token = self.access_token_for(&user)?;

        let refresh_token = generate_refresh_token();
        let expires_at = Utc::now() + ChronoDuration::seconds(self.refresh_expiry as i64);
        self.tokens
            .insert_refresh(user.pkid, &hash_secret(&refresh_token), expires_at)
            .await?;

        Ok(AuthTokens {
            access_token,
            refresh_token,
            expires_in: self.jwt.access_expiry(),
            user,
        })
    }

    fn access_token_for(&self, user: &User) -> ApiResult<String> {
        self.jwt.generate_access_token(
            &user.id,
            &user.username,
            &user.email,
            user.role.as_str(),
            user.can_write,
        )
    }
}
