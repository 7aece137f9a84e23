//! # System Handlers
//!
//! The public health probe. The shape is frozen: `{name, status, version}`
//! with `status` flipping to `degraded` while the startup consistency
//! check failed or timed out (the read-only view into that state).

use actix_web::{web, HttpResponse};

use crate::api::dto::HealthResponse;
use crate::service::consistency::SchemaStatus;
use crate::AppState;

/// `GET /health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let status = match &*state.schema_status.read().unwrap_or_else(|p| p.into_inner()) {
        SchemaStatus::Ok => "ok",
        SchemaStatus::Degraded { .. } => "degraded",
    };

    HttpResponse::Ok().json(HealthResponse {
        name: "moon".to_string(),
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
