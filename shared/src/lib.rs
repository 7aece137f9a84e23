//! # Moon - Shared Library
//!
//! Core shared functionality for the Moon backend.
//!
//! This crate provides the cross-cutting services the server is built on:
//! configuration, error handling, the dialect-aware database layer, ULID
//! generation, credential crypto (passwords, JWTs, API keys) and the
//! authentication middleware.
//!
//! ## Modules
//!
//! | Module | Purpose | Key Types |
//! |--------|---------|-----------|
//! | [`config`] | Layered YAML/env configuration | [`AppConfig`] |
//! | [`errors`] | Standardized error handling | [`ApiError`], [`ApiResult`] |
//! | [`auth`] | JWT, passwords, API keys, middleware | `JwtService`, `PasswordHasher`, `Principal` |
//! | [`database`] | Dialect adapter over SQLite/PostgreSQL/MySQL | [`database::Db`], [`database::Dialect`] |
//! | [`ulid`] | Monotonic sortable identifiers | [`ulid::UlidService`] |
//! | [`validation`] | Request and name validation helpers | custom validators |
//! | [`tracing_config`] | Structured logging setup | [`tracing_config::init_tracing`] |
//!
//! ## Design Decisions
//!
//! 1. **Single source of truth**: shared types live here to prevent drift
//! 2. **Dialect isolation**: nothing above [`database`] branches on the SQL
//!    backend; callers consult [`database::Dialect`] for placeholders and
//!    quoting only
//! 3. **Security first**: credentials are stored only as bcrypt or SHA-256
//!    digests; raw driver errors never reach clients
//! 4. **Observable by default**: structured logging built-in

pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod tracing_config;
pub mod ulid;
pub mod validation;

// Re-exports for convenience - import commonly used types directly from `shared`
pub use config::AppConfig;
pub use errors::{ApiError, ApiResult};
