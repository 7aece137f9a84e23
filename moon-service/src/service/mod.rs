//! # Service Layer
//!
//! Business logic between the HTTP handlers and the repositories.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`registry`] | in-memory schema registry backed by `moon_collections` |
//! | [`consistency`] | startup registry ↔ table reconciliation |
//! | [`collection_service`] | DDL + registry orchestration |
//! | [`data_service`] | list/get/write/aggregate over dynamic collections |
//! | [`auth_service`] | credential lifecycle and the auth pipeline |
//! | [`user_service`] | user administration with business guards |
//! | [`apikey_service`] | API key administration and rotation |
//! | [`rate_limit`] | token bucket + login sliding window |

pub mod apikey_service;
pub mod auth_service;
pub mod collection_service;
pub mod consistency;
pub mod data_service;
pub mod rate_limit;
pub mod registry;
pub mod user_service;

pub use apikey_service::ApiKeyService;
pub use auth_service::AuthService;
pub use collection_service::CollectionService;
pub use data_service::DataService;
pub use rate_limit::{LoginLimiter, RateLimiter};
pub use registry::SchemaRegistry;
pub use user_service::UserService;
