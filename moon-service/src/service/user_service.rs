//! # User Administration Service
//!
//! Admin CRUD over user accounts, including the cross-cutting guards that
//! need business context and therefore live here rather than in
//! middleware:
//!
//! - **Self-modification guard**: an admin cannot update or delete their
//!   own account through `/users:*`.
//! - **Last-admin guard**: the final admin can be neither demoted nor
//!   deleted. The admin count and the mutation run in one transaction so
//!   two concurrent demotions cannot both pass the check.
//! - **Session revocation**: a password change or an explicit
//!   `revoke_sessions` action deletes every refresh token of the target.

use tracing::info;

use shared::auth::{PasswordHasher, PasswordPolicy, Principal, Role};
use shared::database::Db;
use shared::errors::{ApiError, ApiResult};
use shared::ulid::UlidService;
use shared::validation::is_valid_email;
use std::sync::Arc;

use crate::domain::entities::{NewUser, User};
use crate::repository::{TokenRepository, UserRepository};

/// Requested changes for `/users:update`. `None` means "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub can_write: Option<bool>,
    /// `revoke_sessions` is the only recognized action
    pub action: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    db: Db,
    users: UserRepository,
    tokens: TokenRepository,
    hasher: PasswordHasher,
    policy: PasswordPolicy,
    ulid: Arc<UlidService>,
}

impl UserService {
    pub fn new(
        db: Db,
        users: UserRepository,
        tokens: TokenRepository,
        ulid: Arc<UlidService>,
    ) -> Self {
        Self {
            db,
            users,
            tokens,
            hasher: PasswordHasher::new(),
            policy: PasswordPolicy::default(),
            ulid,
        }
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub async fn list(&self) -> ApiResult<Vec<User>> {
        self.users.list().await
    }

    pub async fn get(&self, id: &str) -> ApiResult<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("user with id '{}' not found", id)))
    }

    // =========================================================================
    // CREATE
    // =========================================================================

    pub async fn create(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: &str,
        can_write: Option<bool>,
    ) -> ApiResult<User> {
        if username.trim().is_empty() || username.len() < 3 || username.len() > 50 {
            return Err(ApiError::validation(
                "username must be between 3 and 50 characters",
            ));
        }
        if !is_valid_email(email) {
            return Err(ApiError::validation("invalid email format"));
        }
        self.policy.validate(password)?;

        let (role, can_write) = Role::parse_with_write(role, can_write.unwrap_or(false))
            .ok_or_else(|| ApiError::validation(format!("invalid role '{}'", role)))?;

        // Pre-checks give precise conflict messages; the unique indexes
        // still catch races.
        if self.users.find_by_username(username).await?.is_some() {
            return Err(ApiError::conflict("username already exists"));
        }
        if self.users.find_by_email(email).await?.is_some() {
            return Err(ApiError::conflict("email already exists"));
        }

        let user = self
            .users
            .insert(NewUser {
                id: self.ulid.generate(),
                username: username.to_string(),
                email: email.to_string(),
                password_hash: self.hasher.hash(password)?,
                role,
                can_write,
            })
            .await?;

        info!(user_id = %user.id, username = %user.username, "User created");
        Ok(user)
    }

    // =========================================================================
    // UPDATE
    // =========================================================================

    pub async fn update(
        &self,
        actor: &Principal,
        id: &str,
        changes: UserChanges,
    ) -> ApiResult<User> {
        let mut user = self.get(id).await?;

        if actor.id == user.id {
            return Err(ApiError::validation(
                "cannot modify your own account through this endpoint",
            ));
        }

        if let Some(action) = &changes.action {
            if action != "revoke_sessions" {
                return Err(ApiError::validation(format!("unknown action '{}'", action)));
            }
        }

        let mut revoke_sessions = changes.action.is_some();

        if let Some(username) = &changes.username {
            if username.trim().is_empty() || username.len() < 3 || username.len() > 50 {
                return Err(ApiError::validation(
                    "username must be between 3 and 50 characters",
                ));
            }
            if username != &user.username
                && self.users.find_by_username(username).await?.is_some()
            {
                return Err(ApiError::conflict("username already exists"));
            }
            user.username = username.clone();
        }

        if let Some(email) = &changes.email {
            if !is_valid_email(email) {
                return Err(ApiError::validation("invalid email format"));
            }
            if email != &user.email && self.users.find_by_email(email).await?.is_some() {
                return Err(ApiError::conflict("email already exists"));
            }
            user.email = email.clone();
        }

        if let Some(password) = &changes.password {
            self.policy.validate(password)?;
            user.password_hash = self.hasher.hash(password)?;
            // A password set by an admin invalidates every session
            revoke_sessions = true;
        }

        let mut demoting_admin = false;
        if let Some(role) = &changes.role {
            let (new_role, forced_write) = Role::parse_with_write(
                role,
                changes.can_write.unwrap_or(user.can_write),
            )
            .ok_or_else(|| ApiError::validation(format!("invalid role '{}'", role)))?;

            demoting_admin = user.role == Role::Admin && new_role != Role::Admin;
            user.role = new_role;
            user.can_write = forced_write;
        } else if let Some(can_write) = changes.can_write {
            user.can_write = can_write;
        }

        // The admin count and the mutation must see the same snapshot
        if demoting_admin {
            let mut tx = self.db.begin().await?;
            if self.users.count_admins_in(&mut tx).await? <= 1 {
                return Err(ApiError::validation("cannot demote the last admin"));
            }
            self.users.update_in(&mut tx, &user).await?;
            tx.commit().await?;
        } else {
            self.users.update(&user).await?;
        }

        if revoke_sessions {
            let revoked = self.tokens.delete_for_user(user.pkid).await?;
            info!(user_id = %user.id, sessions_revoked = revoked, "Sessions revoked");
        }

        info!(user_id = %user.id, "User updated");
        self.get(id).await
    }

    // =========================================================================
    // DESTROY
    // =========================================================================

    pub async fn destroy(&self, actor: &Principal, id: &str) -> ApiResult<()> {
        let user = self.get(id).await?;

        if actor.id == user.id {
            return Err(ApiError::validation(
                "cannot delete your own account through this endpoint",
            ));
        }

        let mut tx = self.db.begin().await?;

        if user.role == Role::Admin && self.users.count_admins_in(&mut tx).await? <= 1 {
            return Err(ApiError::validation("cannot delete the last admin"));
        }

        // Explicit token cleanup; the FK cascade is not guaranteed on
        // SQLite connections
        self.tokens.delete_for_user_in(&mut tx, user.pkid).await?;
        self.users.delete_in(&mut tx, user.pkid).await?;
        tx.commit().await?;

        info!(user_id = %user.id, username = %user.username, "User deleted");
        Ok(())
    }
}
