//! # Data Endpoint Handlers
//!
//! The dynamic-collection surface: `/{collection}:{action}` for every
//! registered collection.
//!
//! | Action | Method | Gate |
//! |--------|--------|------|
//! | `list`, `get`, `schema`, `count`, `sum`, `avg`, `min`, `max` | GET | authenticated |
//! | `create`, `update`, `destroy` | POST | write |
//!
//! All data endpoints refuse to serve while the startup consistency check
//! is degraded; the health probe exposes that state.

use actix_web::{web, HttpResponse};
use serde::Serialize;
use serde_json::Value;

use shared::auth::Principal;
use shared::errors::ApiError;

use crate::api::dto::{BatchResponse, DataEnvelope, DataResponse, ListResponse, SchemaDto};
use crate::api::query;
use crate::repository::query_builder::AggregateFunc;
use crate::service::consistency::SchemaStatus;
use crate::service::data_service::BatchOutcome;
use crate::AppState;

/// `{"data": {"value": …}}` for the aggregate endpoints.
#[derive(Debug, Serialize)]
struct ValueDto {
    value: Value,
}

/// Data endpoints are gated on a healthy schema state.
fn ensure_schema_ok(state: &AppState) -> Result<(), ApiError> {
    match &*state.schema_status.read().unwrap_or_else(|p| p.into_inner()) {
        SchemaStatus::Ok => Ok(()),
        SchemaStatus::Degraded { reason } => Err(ApiError::internal(format!(
            "data endpoints disabled: {}",
            reason
        ))),
    }
}

// =============================================================================
// READS
// =============================================================================

/// `GET /{collection}:list`
pub async fn list(
    state: web::Data<AppState>,
    _principal: Principal,
    path: web::Path<String>,
    pairs: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    ensure_schema_ok(&state)?;

    let parsed = query::parse_pairs(&pairs)?;
    let outcome = state.data_service.list(&path, &parsed.options).await?;

    Ok(HttpResponse::Ok().json(ListResponse::from(outcome)))
}

/// `GET /{collection}:get?id=…`
pub async fn get(
    state: web::Data<AppState>,
    _principal: Principal,
    path: web::Path<String>,
    pairs: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    ensure_schema_ok(&state)?;

    let id = query::parse_pairs(&pairs)?
        .id
        .ok_or_else(|| ApiError::validation("the 'id' parameter is required"))?;
    let record = state.data_service.get(&path, &id).await?;

    Ok(HttpResponse::Ok().json(DataResponse { data: record }))
}

/// `GET /{collection}:schema`
pub async fn schema(
    state: web::Data<AppState>,
    _principal: Principal,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    ensure_schema_ok(&state)?;

    let collection = state.data_service.schema(&path).await?;
    Ok(HttpResponse::Ok().json(DataResponse {
        data: SchemaDto::from(collection),
    }))
}

// =============================================================================
// AGGREGATES
// =============================================================================

async fn aggregate(
    state: &AppState,
    collection: &str,
    func: AggregateFunc,
    pairs: &[(String, String)],
) -> Result<HttpResponse, ApiError> {
    ensure_schema_ok(state)?;

    let parsed = query::parse_pairs(pairs)?;
    let value = state
        .data_service
        .aggregate(collection, func, parsed.field.as_deref(), &parsed.options)
        .await?;

    Ok(HttpResponse::Ok().json(DataResponse {
        data: ValueDto { value },
    }))
}

/// `GET /{collection}:count`
pub async fn count(
    state: web::Data<AppState>,
    _principal: Principal,
    path: web::Path<String>,
    pairs: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    aggregate(&state, &path, AggregateFunc::Count, &pairs).await
}

/// `GET /{collection}:sum?field=…`
pub async fn sum(
    state: web::Data<AppState>,
    _principal: Principal,
    path: web::Path<String>,
    pairs: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    aggregate(&state, &path, AggregateFunc::Sum, &pairs).await
}

/// `GET /{collection}:avg?field=…`
pub async fn avg(
    state: web::Data<AppState>,
    _principal: Principal,
    path: web::Path<String>,
    pairs: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    aggregate(&state, &path, AggregateFunc::Avg, &pairs).await
}

/// `GET /{collection}:min?field=…`
pub async fn min(
    state: web::Data<AppState>,
    _principal: Principal,
    path: web::Path<String>,
    pairs: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    aggregate(&state, &path, AggregateFunc::Min, &pairs).await
}

/// `GET /{collection}:max?field=…`
pub async fn max(
    state: web::Data<AppState>,
    _principal: Principal,
    path: web::Path<String>,
    pairs: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    aggregate(&state, &path, AggregateFunc::Max, &pairs).await
}

// =============================================================================
// WRITES
// =============================================================================

/// Best-effort responses succeed with the batch envelope as long as
/// anything succeeded; an all-failed batch is a 400 carrying the same
/// accounting.
fn batch_response(outcome: BatchOutcome, verb: &str, created: bool) -> HttpResponse {
    let all_failed = outcome.all_failed();
    let body = BatchResponse::from_outcome(outcome, verb);
    if all_failed {
        HttpResponse::BadRequest().json(body)
    } else if created {
        HttpResponse::Created().json(body)
    } else {
        HttpResponse::Ok().json(body)
    }
}

/// `POST /{collection}:create[?atomic=…]`
pub async fn create(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
    pairs: web::Query<Vec<(String, String)>>,
    body: web::Json<DataEnvelope<Value>>,
) -> Result<HttpResponse, ApiError> {
    ensure_schema_ok(&state)?;
    principal.require_write()?;

    let parsed = query::parse_pairs(&pairs)?;
    let outcome = state
        .data_service
        .create(&path, &body.data, parsed.atomic)
        .await?;

    Ok(batch_response(outcome, "created", true))
}

/// `POST /{collection}:update[?atomic=…]`
pub async fn update(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
    pairs: web::Query<Vec<(String, String)>>,
    body: web::Json<DataEnvelope<Value>>,
) -> Result<HttpResponse, ApiError> {
    ensure_schema_ok(&state)?;
    principal.require_write()?;

    let parsed = query::parse_pairs(&pairs)?;
    let outcome = state
        .data_service
        .update(&path, &body.data, parsed.atomic)
        .await?;

    Ok(batch_response(outcome, "updated", false))
}

/// `POST /{collection}:destroy[?atomic=…]`
pub async fn destroy(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
    pairs: web::Query<Vec<(String, String)>>,
    body: web::Json<DataEnvelope<Value>>,
) -> Result<HttpResponse, ApiError> {
    ensure_schema_ok(&state)?;
    principal.require_write()?;

    let parsed = query::parse_pairs(&pairs)?;
    let outcome = state
        .data_service
        .destroy(&path, &body.data, parsed.atomic)
        .await?;

    Ok(batch_response(outcome, "deleted", false))
}
