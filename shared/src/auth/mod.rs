//! # Authentication & Credential Crypto
//!
//! Everything a request needs to go from `Authorization: Bearer …` to an
//! authenticated [`Principal`]:
//!
//! | Module | Purpose | Key Types |
//! |--------|---------|-----------|
//! | [`jwt`] | Access token signing/verification (HS256) | [`JwtService`], [`Claims`] |
//! | [`password`] | bcrypt hashing + strength policy | [`PasswordHasher`], [`PasswordPolicy`] |
//! | [`apikey`] | API-key / refresh-token material and hashing | [`apikey::generate_api_key`] |
//! | [`middleware`] | Principal model, extractor and gates | [`Principal`], [`Role`] |
//!
//! ## Credential Shapes
//!
//! Two bearer credential shapes are accepted, distinguished by prefix:
//!
//! - `moon_live_…` → API key (opaque, SHA-256 lookup)
//! - everything else → JWT (signature + claims verification)
//!
//! The prefixes are disjoint (`moon_live_` is not valid base64url JWT
//! header material), so detection is unambiguous.

pub mod apikey;
pub mod jwt;
pub mod middleware;
pub mod password;

pub use jwt::{Claims, JwtService};
pub use middleware::{Principal, PrincipalType, Role};
pub use password::{PasswordHasher, PasswordPolicy};
