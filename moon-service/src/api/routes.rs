//! # Route Configuration
//!
//! Maps the `/{resource}:{action}` URL convention to handlers.
//!
//! ## Route Structure
//!
//! ```text
//! /
//! ├── health                        GET  → system::health       (public)
//! ├── auth:login                    POST → auth::login          (public, login limiter)
//! ├── auth:refresh                  POST → auth::refresh        (public)
//! │
//! └── protected scope (authenticate → rate limit)
//!     ├── auth:logout               POST → auth::logout
//!     ├── auth:me                   GET  → auth::me
//!     ├── auth:change-password      POST → auth::change_password
//!     ├── users:*                   admin
//!     ├── apikeys:*                 admin
//!     ├── collections:*             admin
//!     └── {collection}:*            data endpoints (registered last)
//! ```
//!
//! Admin resources are registered before the dynamic `{collection}`
//! patterns; the name validator additionally reserves those resource
//! names so a collection can never shadow them.

use actix_web::middleware::from_fn;
use actix_web::web;

use super::handlers;
use super::middleware;

/// Configures all routes. Called from `main.rs`:
///
/// ```rust,ignore
/// App::new().configure(routes::configure)
/// ```
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // ─────────────────────────────────────────────────────────────────
        // Public routes (no bearer credential)
        // ─────────────────────────────────────────────────────────────────
        .route("/health", web::get().to(handlers::system::health))
        .route("/auth:login", web::post().to(handlers::auth::login))
        .route("/auth:refresh", web::post().to(handlers::auth::refresh))
        // ─────────────────────────────────────────────────────────────────
        // Protected routes: authenticate, then rate-limit by principal
        // ─────────────────────────────────────────────────────────────────
        .service(
            web::scope("")
                .wrap(from_fn(middleware::rate_limit))
                .wrap(from_fn(middleware::authenticate))
                // Auth session management
                .route("/auth:logout", web::post().to(handlers::auth::logout))
                .route("/auth:me", web::get().to(handlers::auth::me))
                .route(
                    "/auth:change-password",
                    web::post().to(handlers::auth::change_password),
                )
                // User administration (admin gate inside handlers)
                .route("/users:list", web::get().to(handlers::users::list))
                .route("/users:get", web::get().to(handlers::users::get))
                .route("/users:create", web::post().to(handlers::users::create))
                .route("/users:update", web::post().to(handlers::users::update))
                .route("/users:destroy", web::post().to(handlers::users::destroy))
                // API key administration
                .route("/apikeys:list", web::get().to(handlers::apikeys::list))
                .route("/apikeys:get", web::get().to(handlers::apikeys::get))
                .route("/apikeys:create", web::post().to(handlers::apikeys::create))
                .route("/apikeys:update", web::post().to(handlers::apikeys::update))
                .route(
                    "/apikeys:destroy",
                    web::post().to(handlers::apikeys::destroy),
                )
                // Collection administration
                .route(
                    "/collections:list",
                    web::get().to(handlers::collections::list),
                )
                .route(
                    "/collections:get",
                    web::get().to(handlers::collections::get),
                )
                .route(
                    "/collections:create",
                    web::post().to(handlers::collections::create),
                )
                .route(
                    "/collections:update",
                    web::post().to(handlers::collections::update),
                )
                .route(
                    "/collections:destroy",
                    web::post().to(handlers::collections::destroy),
                )
                // Dynamic collection data endpoints, last so the literal
                // admin routes above win
                .route("/{collection}:list", web::get().to(handlers::records::list))
                .route("/{collection}:get", web::get().to(handlers::records::get))
                .route(
                    "/{collection}:schema",
                    web::get().to(handlers::records::schema),
                )
                .route(
                    "/{collection}:count",
                    web::get().to(handlers::records::count),
                )
                .route("/{collection}:sum", web::get().to(handlers::records::sum))
                .route("/{collection}:avg", web::get().to(handlers::records::avg))
                .route("/{collection}:min", web::get().to(handlers::records::min))
                .route("/{collection}:max", web::get().to(handlers::records::max))
                .route(
                    "/{collection}:create",
                    web::post().to(handlers::records::create),
                )
                .route(
                    "/{collection}:update",
                    web::post().to(handlers::records::update),
                )
                .route(
                    "/{collection}:destroy",
                    web::post().to(handlers::records::destroy),
                ),
        );
}
