//! # Password Hashing with bcrypt
//!
//! Secure password storage at a fixed work factor.
//!
//! ## Why bcrypt, Why Cost 12?
//!
//! bcrypt's cost parameter doubles the work per increment; cost 12 lands at
//! a few hundred milliseconds per hash on current hardware - slow enough to
//! make offline brute force expensive, fast enough that a login does not
//! time out. The cost is deliberately not configurable: every stored hash
//! embeds its own cost, so a future bump remains backward compatible.
//!
//! ## Hash Format
//!
//! ```text
//! $2b$12$<22-char salt><31-char hash>
//! ```
//!
//! The salt is generated per hash, so equal passwords produce different
//! hashes.
//!
//! ## Strength Policy
//!
//! Enforced before hashing (creation and password change):
//!
//! | Requirement | Default |
//! |-------------|---------|
//! | Minimum length | 8 |
//! | Uppercase letter | required |
//! | Lowercase letter | required |
//! | Digit | required |
//! | Special character | optional (configurable) |

use crate::errors::ApiError;

/// bcrypt work factor. Fixed by the credential contract.
const BCRYPT_COST: u32 = 12;

// =============================================================================
// Hasher
// =============================================================================

/// Service for hashing and verifying passwords.
///
/// Stateless; exists as a struct so it can be injected and mocked the same
/// way as the other credential services.
#[derive(Clone, Default)]
pub struct PasswordHasher;

impl PasswordHasher {
    pub fn new() -> Self {
        Self
    }

    /// Hashes a password for storage.
    ///
    /// ## Errors
    ///
    /// - Validation error for an empty password
    /// - Internal error if bcrypt fails (effectively never)
    pub fn hash(&self, password: &str) -> Result<String, ApiError> {
        if password.is_empty() {
            return Err(ApiError::validation("password must not be empty"));
        }

        bcrypt::hash(password, BCRYPT_COST).map_err(|e| {
            ApiError::internal(format!("Password hashing failed: {}", e))
        })
    }

    /// Verifies a password against a stored hash in constant time.
    ///
    /// ## Returns
    ///
    /// - `Ok(true)` - password matches
    /// - `Ok(false)` - password doesn't match
    /// - `Err(...)` - stored hash is malformed
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, ApiError> {
        bcrypt::verify(password, hash).map_err(|e| {
            ApiError::internal(format!("Password verification failed: {}", e))
        })
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

// =============================================================================
// Strength Policy
// =============================================================================

/// Password strength requirements checked before hashing.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    /// Require at least one character outside `[A-Za-z0-9]`.
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { require_special: false }
    }
}

impl PasswordPolicy {
    /// Validates a candidate password against the policy.
    ///
    /// ## Errors
    ///
    /// Returns a 400 naming the first failed requirement.
    pub fn validate(&self, password: &str) -> Result<(), ApiError> {
        if password.len() < 8 {
            return Err(ApiError::validation(
                "password must be at least 8 characters long",
            ));
        }
        if !password.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(ApiError::validation(
                "password must contain at least one uppercase letter",
            ));
        }
        if !password.chars().any(|c| c.is_ascii_lowercase()) {
            return Err(ApiError::validation(
                "password must contain at least one lowercase letter",
            ));
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(ApiError::validation(
                "password must contain at least one digit",
            ));
        }
        if self.require_special && password.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ApiError::validation(
                "password must contain at least one special character",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_correct_password() {
        let hasher = PasswordHasher::new();
        let password = "MySecureP@ssw0rd";

        let hash = hasher.hash(password).unwrap();

        assert_ne!(hash, password);
        assert!(hasher.verify(password, &hash).unwrap());
    }

    #[test]
    fn test_verify_wrong_password() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("CorrectPass1").unwrap();

        assert!(!hasher.verify("WrongPass1", &hash).unwrap());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let hasher = PasswordHasher::new();
        let password = "SamePassword1";

        let hash1 = hasher.hash(password).unwrap();
        let hash2 = hasher.hash(password).unwrap();

        // Each hash gets its own salt
        assert_ne!(hash1, hash2);
        assert!(hasher.verify(password, &hash1).unwrap());
        assert!(hasher.verify(password, &hash2).unwrap());
    }

    #[test]
    fn test_hash_embeds_cost_12() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("SomePassword1").unwrap();
        assert!(hash.contains("$12$"), "unexpected hash format: {}", hash);
    }

    #[test]
    fn test_empty_password_rejected() {
        let hasher = PasswordHasher::new();
        assert!(hasher.hash("").is_err());
    }

    #[test]
    fn test_policy_accepts_valid_passwords() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("AdminPass123").is_ok());
        assert!(policy.validate("Pass123#").is_ok());
    }

    #[test]
    fn test_policy_rejects_weak_passwords() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("Sh0rt").is_err()); // too short
        assert!(policy.validate("alllower1").is_err()); // no uppercase
        assert!(policy.validate("ALLUPPER1").is_err()); // no lowercase
        assert!(policy.validate("NoDigitsHere").is_err()); // no digit
    }

    #[test]
    fn test_policy_special_character_configurable() {
        let relaxed = PasswordPolicy { require_special: false };
        let strict = PasswordPolicy { require_special: true };

        assert!(relaxed.validate("AdminPass123").is_ok());
        assert!(strict.validate("AdminPass123").is_err());
        assert!(strict.validate("AdminPass123#").is_ok());
    }
}
