//! # Middleware Chain
//!
//! The fixed per-request composition:
//!
//! ```text
//! CORS → request logging → recover/timeout → auth → rate limit → authorize → handler
//! ```
//!
//! CORS and logging are actix-level wraps registered in `main.rs`
//! (logging sits before auth so unauthenticated attempts are audited).
//! This module provides the function middlewares for the protected scope:
//!
//! - [`recover`] - catches handler panics and enforces the per-request
//!   deadline; both surface as the generic 500.
//! - [`authenticate`] - bearer parsing, credential-shape detection and
//!   validation; attaches [`Principal`] and the raw bearer token to the
//!   request so downstream code never re-parses the header.
//! - [`rate_limit`] - per-principal token bucket, after auth so the
//!   bucket is keyed by the real principal. Login endpoints skip this
//!   chain entirely and use the login limiter inside the handler.
//!
//! Authorization gates ([`Principal::require_admin`] and friends) run at
//! the top of each handler, where the required gate is route-specific.

use std::time::Duration;

use actix_web::body::{BoxBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::middleware::Next;
use actix_web::{web, Error, HttpMessage, HttpResponse};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::error;

use shared::auth::middleware::extract_bearer;
use shared::auth::Principal;
use shared::errors::{ApiError, ErrorResponse};

use crate::AppState;

/// The raw bearer credential, stashed by [`authenticate`] for handlers
/// that need the token itself (logout blacklists it).
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl actix_web::FromRequest for BearerToken {
    type Error = Error;
    type Future = std::future::Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        let result = req
            .extensions()
            .get::<BearerToken>()
            .cloned()
            .ok_or_else(|| ApiError::AuthenticationRequired.into());
        std::future::ready(result)
    }
}

// =============================================================================
// Recover & Deadline
// =============================================================================

/// Panic recovery plus the per-request deadline. Dropping the handler
/// future on timeout cancels any in-flight database work with it.
pub async fn recover(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let timeout = req
        .app_data::<web::Data<AppState>>()
        .map(|state| state.config.server.request_timeout)
        .unwrap_or(30);

    let (http_req, payload) = req.into_parts();
    let req = ServiceRequest::from_parts(http_req.clone(), payload);

    let guarded = AssertUnwindSafe(next.call(req)).catch_unwind();
    match tokio::time::timeout(Duration::from_secs(timeout), guarded).await {
        Ok(Ok(Ok(res))) => Ok(res.map_into_boxed_body()),
        Ok(Ok(Err(err))) => Err(err),
        Ok(Err(_panic)) => {
            error!(path = %http_req.path(), "Handler panicked");
            Ok(ServiceResponse::new(http_req, internal_error()))
        }
        Err(_elapsed) => {
            error!(path = %http_req.path(), timeout_seconds = timeout, "Request deadline exceeded");
            Ok(ServiceResponse::new(http_req, internal_error()))
        }
    }
}

fn internal_error() -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorResponse {
        message: "An unexpected error occurred".to_string(),
    })
}

// =============================================================================
// Authentication
// =============================================================================

/// Validates the bearer credential and attaches the principal.
///
/// ## Failure Modes
///
/// - No header / wrong scheme → 401 `authentication required`
/// - Bad, expired, blacklisted or unknown credential → 401
///   `invalid or expired token`
pub async fn authenticate(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .cloned()
        .ok_or_else(|| ApiError::internal("application state missing"))?;

    let token = {
        let header = req
            .headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::AuthenticationRequired)?;
        extract_bearer(header)
            .ok_or(ApiError::AuthenticationRequired)?
            .to_string()
    };

    let principal = state.auth_service.authenticate(&token).await?;

    req.extensions_mut().insert(BearerToken(token));
    req.extensions_mut().insert(principal);

    next.call(req).await
}

// =============================================================================
// Rate Limiting
// =============================================================================

/// Per-principal token bucket; runs after [`authenticate`].
///
/// Allowed requests carry `X-RateLimit-Limit/-Remaining/-Reset`; denials
/// are 429 with `Retry-After`.
pub async fn rate_limit(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .cloned()
        .ok_or_else(|| ApiError::internal("application state missing"))?;

    let principal = req
        .extensions()
        .get::<Principal>()
        .cloned()
        .ok_or(ApiError::AuthenticationRequired)?;

    let decision = state.rate_limiter.check(&principal);
    if !decision.allowed {
        return Err(ApiError::RateLimited {
            retry_after_seconds: decision.retry_after_seconds,
        }
        .into());
    }

    let mut res = next.call(req).await?;
    let headers = res.headers_mut();
    insert_header(headers, "x-ratelimit-limit", decision.limit.to_string());
    insert_header(headers, "x-ratelimit-remaining", decision.remaining.to_string());
    insert_header(headers, "x-ratelimit-reset", decision.reset_seconds.to_string());
    Ok(res)
}

fn insert_header(headers: &mut actix_web::http::header::HeaderMap, name: &'static str, value: String) {
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}
