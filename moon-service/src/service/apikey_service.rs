//! # API Key Administration Service
//!
//! CRUD over service credentials. The plaintext key exists exactly twice:
//! in the create response and in the rotate response. Rotation replaces
//! the stored hash in place (same `id`), so the previous secret dies the
//! moment the new one is issued.

use std::sync::Arc;
use tracing::info;

use shared::auth::apikey::{generate_api_key, hash_secret};
use shared::auth::Role;
use shared::errors::{ApiError, ApiResult};
use shared::ulid::UlidService;

use crate::domain::entities::ApiKey;
use crate::repository::apikey_repository::NewApiKey;
use crate::repository::ApiKeyRepository;

/// Requested changes for `/apikeys:update`. `None` means "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct ApiKeyChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub role: Option<String>,
    pub can_write: Option<bool>,
    /// `rotate` is the only recognized action
    pub action: Option<String>,
}

/// A key together with its plaintext secret, returned exactly once.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub key: ApiKey,
    pub plaintext: String,
}

#[derive(Clone)]
pub struct ApiKeyService {
    apikeys: ApiKeyRepository,
    ulid: Arc<UlidService>,
}

impl ApiKeyService {
    pub fn new(apikeys: ApiKeyRepository, ulid: Arc<UlidService>) -> Self {
        Self { apikeys, ulid }
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub async fn list(&self) -> ApiResult<Vec<ApiKey>> {
        self.apikeys.list().await
    }

    pub async fn get(&self, id: &str) -> ApiResult<ApiKey> {
        self.apikeys
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("API key with id '{}' not found", id)))
    }

    // =========================================================================
    // CREATE
    // =========================================================================

    pub async fn create(
        &self,
        name: &str,
        description: Option<String>,
        role: &str,
        can_write: Option<bool>,
    ) -> ApiResult<IssuedKey> {
        validate_name(name)?;
        validate_description(description.as_deref())?;

        let (role, can_write) = Role::parse_with_write(role, can_write.unwrap_or(false))
            .ok_or_else(|| ApiError::validation(format!("invalid role '{}'", role)))?;

        if self.apikeys.find_by_name(name).await?.is_some() {
            return Err(ApiError::conflict("API key name already exists"));
        }

        let plaintext = generate_api_key();
        let key = self
            .apikeys
            .insert(NewApiKey {
                id: self.ulid.generate(),
                name: name.to_string(),
                description,
                key_hash: hash_secret(&plaintext),
                role,
                can_write,
            })
            .await?;

        info!(apikey_id = %key.id, name = %key.name, "API key created");
        Ok(IssuedKey { key, plaintext })
    }

    // =========================================================================
    // UPDATE & ROTATE
    // =========================================================================

    /// Applies metadata changes and/or rotates the secret. The plaintext
    /// in the result is `Some` only after a rotation.
    pub async fn update(
        &self,
        id: &str,
        changes: ApiKeyChanges,
    ) -> ApiResult<(ApiKey, Option<String>)> {
        let mut key = self.get(id).await?;

        let rotate = match changes.action.as_deref() {
            None => false,
            Some("rotate") => true,
            Some(action) => {
                return Err(ApiError::validation(format!("unknown action '{}'", action)))
            }
        };

        if let Some(name) = &changes.name {
            validate_name(name)?;
            if name != &key.name && self.apikeys.find_by_name(name).await?.is_some() {
                return Err(ApiError::conflict("API key name already exists"));
            }
            key.name = name.clone();
        }

        if let Some(description) = &changes.description {
            validate_description(Some(description))?;
            key.description = Some(description.clone());
        }

        if let Some(role) = &changes.role {
            let (new_role, forced_write) =
                Role::parse_with_write(role, changes.can_write.unwrap_or(key.can_write))
                    .ok_or_else(|| ApiError::validation(format!("invalid role '{}'", role)))?;
            key.role = new_role;
            key.can_write = forced_write;
        } else if let Some(can_write) = changes.can_write {
            key.can_write = can_write;
        }

        let plaintext = if rotate {
            let plaintext = generate_api_key();
            key.key_hash = hash_secret(&plaintext);
            Some(plaintext)
        } else {
            None
        };

        self.apikeys.update(&key).await?;

        if rotate {
            info!(apikey_id = %key.id, "API key rotated");
        } else {
            info!(apikey_id = %key.id, "API key updated");
        }

        Ok((self.get(id).await?, plaintext))
    }

    // =========================================================================
    // DESTROY
    // =========================================================================

    pub async fn destroy(&self, id: &str) -> ApiResult<()> {
        let key = self.get(id).await?;
        self.apikeys.delete(key.pkid).await?;
        info!(apikey_id = %key.id, name = %key.name, "API key deleted");
        Ok(())
    }
}

fn validate_name(name: &str) -> ApiResult<()> {
    if name.trim().is_empty() || name.len() < 3 || name.len() > 100 {
        return Err(ApiError::validation(
            "API key name must be between 3 and 100 characters",
        ));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> ApiResult<()> {
    if let Some(description) = description {
        if description.len() > 500 {
            return Err(ApiError::validation(
                "API key description must be at most 500 characters",
            ));
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_bounds() {
        assert!(validate_name("ci").is_err());
        assert!(validate_name("ci-deploy").is_ok());
        assert!(validate_name(&"x".repeat(100)).is_ok());
        assert!(validate_name(&"x".repeat(101)).is_err());
        assert!(validate_name("   ").is_err());
    }

    #[test]
    fn test_description_bounds() {
        assert!(validate_description(None).is_ok());
        assert!(validate_description(Some("deploy bot")).is_ok());
        assert!(validate_description(Some(&"d".repeat(500))).is_ok());
        assert!(validate_description(Some(&"d".repeat(501))).is_err());
    }
}
