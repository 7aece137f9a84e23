//! # Application Configuration
//!
//! Centralized configuration management from a YAML file plus environment
//! overrides.
//!
//! ## How It Works
//!
//! Configuration is loaded from multiple sources in order of precedence:
//!
//! 1. **Default values** - Sensible defaults for development
//! 2. **YAML file** - `$MOON_CONFIG` if set, else `./moon.yaml` if present
//! 3. **Environment variables** - `MOON_` prefix with `__` nesting
//! 4. **Bare overrides** - `DATABASE_URL`, `JWT_SECRET` (Docker convenience)
//!
//! ## Example `moon.yaml`
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 8080
//! database:
//!   connection_string: sqlite://moon.db
//! jwt:
//!   secret: change_me_to_a_32_plus_character_secret
//!   access_expiry: 900
//!   refresh_expiry: 604800
//! rate_limit:
//!   user_rpm: 120
//!   apikey_rpm: 300
//! auth:
//!   bootstrap_admin:
//!     username: admin
//!     email: admin@example.com
//!     password: AdminPass123
//! ```
//!
//! ## Security Notes
//!
//! - `jwt.secret` is required and must be at least 32 characters; loading
//!   fails otherwise.
//! - Never commit config files with real secrets.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

/// Main application configuration.
///
/// Immutable after creation - create once at startup and share via `Arc`
/// or `web::Data`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Database connection and pool settings
    pub database: DatabaseConfig,

    /// JWT token configuration
    pub jwt: JwtConfig,

    /// API key settings
    pub apikey: ApiKeyConfig,

    /// Request and login rate limits
    pub rate_limit: RateLimitConfig,

    /// Cursor pagination bounds
    pub pagination: PaginationConfig,

    /// Batch write bounds
    pub batch: BatchConfig,

    /// Startup consistency-check policy
    pub recovery: RecoveryConfig,

    /// Bootstrap and auth options
    pub auth: AuthConfig,

    /// Security options (CORS)
    pub security: SecurityConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind to. Default: `0.0.0.0`
    #[serde(default = "default_host")]
    pub host: String,

    /// Port number to listen on. Default: `8080`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request deadline in seconds. Default: `30`
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

/// Database configuration.
///
/// The connection string scheme selects the dialect:
/// `sqlite://…`, `postgres://…` or `mysql://…`.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. `sqlite://moon.db`
    pub connection_string: String,

    /// Maximum open connections in the pool. Default: `10`
    #[serde(default = "default_max_open_conns")]
    pub max_open_conns: u32,

    /// Idle connections to keep around. Default: `2`
    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: u32,
}

/// JWT (JSON Web Token) configuration.
///
/// Access tokens are short-lived JWTs; refresh tokens are opaque,
/// single-use and database-backed.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Secret key for HS256 signing. Required, minimum 32 characters.
    pub secret: String,

    /// Access token time-to-live in seconds. Default: `900` (15 minutes)
    #[serde(default = "default_access_expiry")]
    pub access_expiry: u64,

    /// Refresh token time-to-live in seconds. Default: `604800` (7 days)
    #[serde(default = "default_refresh_expiry")]
    pub refresh_expiry: u64,

    /// Token issuer claim (`iss`). Default: `moon`
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

/// API key settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyConfig {
    /// Whether API-key authentication is accepted. Default: `true`
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Requests per minute for user principals. Default: `120`
    #[serde(default = "default_user_rpm")]
    pub user_rpm: u32,

    /// Requests per minute for API-key principals. Default: `300`
    #[serde(default = "default_apikey_rpm")]
    pub apikey_rpm: u32,

    /// Login attempts allowed per (ip, username) window. Default: `5`
    #[serde(default = "default_login_max_attempts")]
    pub login_max_attempts: u32,

    /// Login window length in seconds. Default: `900`
    #[serde(default = "default_login_window_seconds")]
    pub login_window_seconds: u64,
}

/// Pagination bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    /// Page size when the client omits `limit`. Default: `50`
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Upper bound for `limit`. Default: `200`
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

/// Batch write bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Maximum items per batch request. Default: `100`
    #[serde(default = "default_batch_max_size")]
    pub max_size: u32,

    /// Maximum request payload in bytes. Default: `1048576` (1 MiB)
    #[serde(default = "default_batch_max_payload")]
    pub max_payload_bytes: usize,
}

/// Startup consistency-check policy.
#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryConfig {
    /// Attempt automatic repair of registry/table drift. Default: `true`
    #[serde(default = "default_true")]
    pub auto_repair: bool,

    /// Drop orphaned tables instead of re-registering them. Default: `false`
    #[serde(default)]
    pub drop_orphans: bool,

    /// Consistency check timeout in seconds. Default: `5`
    #[serde(default = "default_check_timeout")]
    pub check_timeout: u64,
}

/// Auth bootstrap options.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Admin account created when the users table is empty at startup.
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Bootstrap admin credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Security options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors: CorsConfig,
}

/// CORS configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins; empty means any origin (development behavior).
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl AppConfig {
    /// Loads configuration from the YAML file and environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required values are missing, cannot be
    /// parsed, or fail the sanity checks (`jwt.secret` length).
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (development convenience)
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("MOON_CONFIG").unwrap_or_else(|_| "moon.yaml".to_string());

        let config = Config::builder()
            // Set sensible defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.request_timeout", 30)?
            // YAML file (optional unless MOON_CONFIG points at a missing file)
            .add_source(File::new(&config_path, FileFormat::Yaml).required(false))
            // MOON_* environment variables
            .add_source(
                Environment::with_prefix("MOON")
                    .separator("__")
                    .try_parsing(true),
            )
            // Docker-compatible overrides (no prefix)
            .set_override_option(
                "database.connection_string",
                std::env::var("DATABASE_URL").ok(),
            )?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Sanity checks that cannot be expressed as serde defaults.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.len() < 32 {
            return Err(ConfigError::Message(
                "jwt.secret must be at least 32 characters".to_string(),
            ));
        }
        if self.database.connection_string.is_empty() {
            return Err(ConfigError::Message(
                "database.connection_string is required".to_string(),
            ));
        }
        if self.pagination.default_page_size == 0
            || self.pagination.default_page_size > self.pagination.max_page_size
        {
            return Err(ConfigError::Message(
                "pagination.default_page_size must be in 1..=max_page_size".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Default Value Functions
// =============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_open_conns() -> u32 {
    10
}

fn default_max_idle_conns() -> u32 {
    2
}

fn default_access_expiry() -> u64 {
    900 // 15 minutes
}

fn default_refresh_expiry() -> u64 {
    604800 // 7 days
}

fn default_issuer() -> String {
    "moon".to_string()
}

fn default_true() -> bool {
    true
}

fn default_user_rpm() -> u32 {
    120
}

fn default_apikey_rpm() -> u32 {
    300
}

fn default_login_max_attempts() -> u32 {
    5
}

fn default_login_window_seconds() -> u64 {
    900
}

fn default_page_size() -> u32 {
    50
}

fn default_max_page_size() -> u32 {
    200
}

fn default_batch_max_size() -> u32 {
    100
}

fn default_batch_max_payload() -> usize {
    1024 * 1024
}

fn default_check_timeout() -> u64 {
    5
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout: default_request_timeout(),
            },
            database: DatabaseConfig {
                connection_string: "sqlite://moon.db".to_string(),
                max_open_conns: default_max_open_conns(),
                max_idle_conns: default_max_idle_conns(),
            },
            jwt: JwtConfig {
                secret: "0123456789abcdef0123456789abcdef".to_string(),
                access_expiry: default_access_expiry(),
                refresh_expiry: default_refresh_expiry(),
                issuer: default_issuer(),
            },
            apikey: ApiKeyConfig { enabled: true },
            rate_limit: RateLimitConfig {
                user_rpm: default_user_rpm(),
                apikey_rpm: default_apikey_rpm(),
                login_max_attempts: default_login_max_attempts(),
                login_window_seconds: default_login_window_seconds(),
            },
            pagination: PaginationConfig {
                default_page_size: default_page_size(),
                max_page_size: default_max_page_size(),
            },
            batch: BatchConfig {
                max_size: default_batch_max_size(),
                max_payload_bytes: default_batch_max_payload(),
            },
            recovery: RecoveryConfig {
                auto_repair: true,
                drop_orphans: false,
                check_timeout: default_check_timeout(),
            },
            auth: AuthConfig { bootstrap_admin: None },
            security: SecurityConfig::default(),
        }
    }

    #[test]
    fn test_minimal_config_validates() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let mut cfg = minimal();
        cfg.jwt.secret = "too-short".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_page_size_bounds_enforced() {
        let mut cfg = minimal();
        cfg.pagination.default_page_size = 500;
        cfg.pagination.max_page_size = 200;
        assert!(cfg.validate().is_err());
    }
}
