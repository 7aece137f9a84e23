//! # Opaque Credential Material
//!
//! Generation and hashing of the two opaque credential kinds: API keys and
//! refresh tokens.
//!
//! ## API Keys
//!
//! ```text
//! moon_live_A7c9…  (prefix + 64 chars drawn uniformly from base62)
//! ```
//!
//! The prefix makes the credential shape detectable on input and keeps the
//! key space disjoint from JWTs. The plaintext is shown exactly once (at
//! creation and at rotation); only the SHA-256 hex digest is stored, and
//! lookup is by digest.
//!
//! ## Refresh Tokens
//!
//! 32 random bytes, URL-safe base64 without padding (43 chars). Stored only
//! as SHA-256 hex; single-use - consumption deletes the row.
//!
//! ## Uniformity Note
//!
//! Key characters are sampled with `Rng::gen_range(0..62)` per character
//! rather than masking bytes, so each of the 62 symbols is equally likely.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Prefix identifying an API key on the wire.
pub const API_KEY_PREFIX: &str = "moon_live_";

/// Random characters after the prefix.
const API_KEY_RANDOM_LEN: usize = 64;

/// Alphabet for the random key body.
const BASE62: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Bytes of entropy in a refresh token.
const REFRESH_TOKEN_BYTES: usize = 32;

/// Generates a new API-key plaintext: `moon_live_` + 64 base62 chars.
pub fn generate_api_key() -> String {
    let mut rng = OsRng;
    let mut key = String::with_capacity(API_KEY_PREFIX.len() + API_KEY_RANDOM_LEN);
    key.push_str(API_KEY_PREFIX);
    for _ in 0..API_KEY_RANDOM_LEN {
        let idx = rng.gen_range(0..BASE62.len());
        key.push(BASE62[idx] as char);
    }
    key
}

/// Generates a new opaque refresh token (URL-safe base64, no padding).
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest of a presented secret.
///
/// The single storage/lookup form for API keys, refresh tokens and
/// blacklisted access tokens.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a presented bearer credential has the API-key shape.
pub fn is_api_key(token: &str) -> bool {
    token.starts_with(API_KEY_PREFIX)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_format() {
        let key = generate_api_key();
        assert!(key.starts_with(API_KEY_PREFIX));
        assert_eq!(key.len(), API_KEY_PREFIX.len() + 64);

        let body = &key[API_KEY_PREFIX.len()..];
        assert!(body.bytes().all(|b| BASE62.contains(&b)));
    }

    #[test]
    fn test_api_keys_are_unique() {
        let k1 = generate_api_key();
        let k2 = generate_api_key();
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_refresh_token_format() {
        let token = generate_refresh_token();
        // 32 bytes -> 43 base64url chars without padding
        assert_eq!(token.len(), 43);
        assert!(URL_SAFE_NO_PAD.decode(&token).is_ok());
    }

    #[test]
    fn test_hash_secret_is_deterministic_sha256_hex() {
        let h1 = hash_secret("some-secret");
        let h2 = hash_secret("some-secret");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(hash_secret("other-secret"), h1);
    }

    #[test]
    fn test_known_sha256_vector() {
        // sha256("abc")
        assert_eq!(
            hash_secret("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_api_key_detection() {
        assert!(is_api_key("moon_live_abc"));
        assert!(!is_api_key("eyJhbGciOiJIUzI1NiJ9.x.y"));
        assert!(!is_api_key("moon_test_abc"));
    }
}
