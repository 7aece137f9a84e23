//! # Moon - Dynamic Collection Backend
//!
//! A headless HTTP/JSON API over a relational database: clients define
//! **collections** (tables) at runtime, perform CRUD and analytic queries
//! with filtering, sorting, search, projection and cursor pagination, and
//! authenticate with JWTs (users) or `moon_live_…` API keys (services)
//! under role- and write-permission gates.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        HTTP Layer (api/)                        │
//! │   routes · handlers · DTOs · query parsing · middleware chain   │
//! └──────────────────────────────┬──────────────────────────────────┘
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Service Layer (service/)                    │
//! │  auth · users · apikeys · collections · data engine · registry  │
//! │              consistency checker · rate limiters                │
//! └──────────────────────────────┬──────────────────────────────────┘
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Repository Layer (repository/)                 │
//! │     system tables · dynamic records · pure query builder        │
//! └──────────────────────────────┬──────────────────────────────────┘
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │             Dialect Adapter (shared::database)                  │
//! │                SQLite · PostgreSQL · MySQL                      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Request Path
//!
//! CORS → request logging → recover/deadline → auth → rate limit →
//! authorize → handler. Logging precedes auth so unauthenticated
//! attempts are audited; rate limiting follows auth so buckets are keyed
//! by the real principal.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (YAML + environment)
//! 2. Initialize structured logging
//! 3. Connect the pool, create missing system tables
//! 4. Load the schema registry and run the consistency check (bounded by
//!    `recovery.check_timeout`; a timeout degrades data endpoints)
//! 5. Bootstrap the configured admin if the users table is empty
//! 6. Spawn the purge and bucket-eviction background jobs
//! 7. Serve

use std::sync::{Arc, RwLock};
use std::time::Duration;

use actix_cors::Cors;
use actix_web::middleware::from_fn;
use actix_web::{web, App, HttpServer};
use tracing::info;

use shared::auth::jwt::JwtService;
use shared::config::AppConfig;
use shared::database::Db;
use shared::errors::ApiError;
use shared::tracing_config;
use shared::ulid::UlidService;

mod api;
mod domain;
mod repository;
mod service;

use api::{middleware, routes};
use repository::{
    bootstrap, ApiKeyRepository, RecordRepository, RegistryRepository, TokenRepository,
    UserRepository,
};
use service::consistency::{self, SchemaStatus};
use service::{
    ApiKeyService, AuthService, CollectionService, DataService, LoginLimiter, RateLimiter,
    SchemaRegistry, UserService,
};

/// Shared application state injected into handlers and middleware.
///
/// Cloning is cheap: services hold `Arc`-based pools and registries.
pub struct AppState {
    pub config: AppConfig,
    pub auth_service: AuthService,
    pub user_service: UserService,
    pub apikey_service: ApiKeyService,
    pub collection_service: CollectionService,
    pub data_service: DataService,
    pub rate_limiter: Arc<RateLimiter>,
    /// Outcome of the startup consistency check; data endpoints refuse to
    /// serve while degraded
    pub schema_status: Arc<RwLock<SchemaStatus>>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // ─────────────────────────────────────────────────────────────────────
    // Step 1: Configuration
    // ─────────────────────────────────────────────────────────────────────
    let config = AppConfig::load().expect("Failed to load configuration");

    // ─────────────────────────────────────────────────────────────────────
    // Step 2: Structured logging
    // ─────────────────────────────────────────────────────────────────────
    let production = std::env::var("MOON_ENV")
        .map(|env| env == "production")
        .unwrap_or(false);
    tracing_config::init_tracing("moon", production);

    info!(
        host = %config.server.host,
        port = config.server.port,
        "Starting moon"
    );

    // ─────────────────────────────────────────────────────────────────────
    // Step 3: Database pool and system tables
    // ─────────────────────────────────────────────────────────────────────
    let db = Db::connect(&config.database)
        .await
        .expect("Failed to create database pool");
    bootstrap::ensure_system_tables(&db)
        .await
        .expect("Failed to create system tables");

    // ─────────────────────────────────────────────────────────────────────
    // Step 4: Services
    // ─────────────────────────────────────────────────────────────────────
    let ulid = Arc::new(UlidService::new());
    let jwt = Arc::new(JwtService::new(config.jwt.clone()));
    let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    let login_limiter = Arc::new(LoginLimiter::new(&config.rate_limit));

    let user_repo = UserRepository::new(db.clone());
    let token_repo = TokenRepository::new(db.clone());
    let apikey_repo = ApiKeyRepository::new(db.clone());
    let registry_repo = RegistryRepository::new(db.clone());
    let record_repo = RecordRepository::new(db.clone());

    let registry = Arc::new(SchemaRegistry::new(registry_repo));
    registry.load().await.expect("Failed to load schema registry");

    let auth_service = AuthService::new(
        db.clone(),
        user_repo.clone(),
        token_repo.clone(),
        apikey_repo.clone(),
        jwt.clone(),
        login_limiter.clone(),
        ulid.clone(),
        &config,
    );
    let user_service = UserService::new(
        db.clone(),
        user_repo.clone(),
        token_repo.clone(),
        ulid.clone(),
    );
    let apikey_service = ApiKeyService::new(apikey_repo.clone(), ulid.clone());
    let collection_service = CollectionService::new(db.clone(), registry.clone());
    let data_service = DataService::new(
        registry.clone(),
        record_repo,
        ulid.clone(),
        config.pagination.clone(),
        config.batch.clone(),
    );

    // ─────────────────────────────────────────────────────────────────────
    // Step 5: Consistency check (bounded) and admin bootstrap
    // ─────────────────────────────────────────────────────────────────────
    let status = consistency::check_with_timeout(&db, &registry, &config.recovery).await;
    let schema_status = Arc::new(RwLock::new(status));

    auth_service
        .bootstrap_admin(&config)
        .await
        .expect("Failed to bootstrap admin account");

    // ─────────────────────────────────────────────────────────────────────
    // Step 6: Background jobs
    // ─────────────────────────────────────────────────────────────────────
    // Hourly purge keeps the refresh-token and blacklist tables bounded
    // by their TTLs.
    {
        let token_repo = token_repo.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                match token_repo.purge_expired().await {
                    Ok(purged) if purged > 0 => {
                        info!(purged, "Purged expired tokens");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Token purge failed"),
                }
            }
        });
    }
    // Five-minute sweep evicts full rate-limit buckets and elapsed login
    // windows.
    {
        let rate_limiter = rate_limiter.clone();
        let login_limiter = login_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            interval.tick().await;
            loop {
                interval.tick().await;
                rate_limiter.evict_stale();
                login_limiter.evict_stale();
            }
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Step 7: HTTP server
    // ─────────────────────────────────────────────────────────────────────
    let app_state = web::Data::new(AppState {
        config: config.clone(),
        auth_service,
        user_service,
        apikey_service,
        collection_service,
        data_service,
        rate_limiter,
        schema_status,
    });

    let server_host = config.server.host.clone();
    let server_port = config.server.port;
    let max_payload = config.batch.max_payload_bytes;
    let allowed_origins = config.security.cors.allowed_origins.clone();

    info!("Server listening on {}:{}", server_host, server_port);

    HttpServer::new(move || {
        // An empty origin list means any origin (development behavior)
        let cors = if allowed_origins.is_empty() {
            Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600)
        } else {
            let mut cors = Cors::default()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);
            for origin in &allowed_origins {
                cors = cors.allowed_origin(origin);
            }
            cors
        };

        // Payload bound and our error envelope for malformed JSON
        let json_config = web::JsonConfig::default()
            .limit(max_payload)
            .error_handler(|err, _req| ApiError::validation(err.to_string()).into());

        App::new()
            // Middleware (registration is inside-out: CORS handles the
            // request first, then logging, then recover/deadline)
            .wrap(from_fn(middleware::recover))
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(cors)
            // Shared state
            .app_data(app_state.clone())
            .app_data(json_config)
            // Routes
            .configure(routes::configure)
    })
    .bind((server_host, server_port))?
    .run()
    .await
}
