//! # Collection Administration Handlers
//!
//! Admin-only schema management. Collections are keyed by `?name=`;
//! `create` takes the full definition, `update` a full replacement column
//! list (the service computes the DDL diff).

use actix_web::{web, HttpResponse};

use shared::auth::Principal;
use shared::errors::ApiError;

use crate::api::dto::{
    CreateCollectionRequest, DataEnvelope, DataResponse, MessageResponse,
    UpdateCollectionRequest,
};
use crate::api::query;
use crate::AppState;

fn required_name(pairs: &[(String, String)]) -> Result<String, ApiError> {
    query::parse_pairs(pairs)?
        .name
        .ok_or_else(|| ApiError::validation("the 'name' parameter is required"))
}

/// `GET /collections:list`
pub async fn list(
    state: web::Data<AppState>,
    principal: Principal,
) -> Result<HttpResponse, ApiError> {
    principal.require_admin()?;

    let data = state.collection_service.list().await;
    Ok(HttpResponse::Ok().json(DataResponse { data }))
}

/// `GET /collections:get?name=…`
pub async fn get(
    state: web::Data<AppState>,
    principal: Principal,
    pairs: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    principal.require_admin()?;

    let name = required_name(&pairs)?;
    let collection = state.collection_service.get(&name).await?;
    Ok(HttpResponse::Ok().json(DataResponse { data: collection }))
}

/// `POST /collections:create`
pub async fn create(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<DataEnvelope<CreateCollectionRequest>>,
) -> Result<HttpResponse, ApiError> {
    principal.require_admin()?;

    let collection = state
        .collection_service
        .create(body.into_inner().data)
        .await?;

    Ok(HttpResponse::Created().json(DataResponse { data: collection }))
}

/// `POST /collections:update?name=…`
pub async fn update(
    state: web::Data<AppState>,
    principal: Principal,
    pairs: web::Query<Vec<(String, String)>>,
    body: web::Json<DataEnvelope<UpdateCollectionRequest>>,
) -> Result<HttpResponse, ApiError> {
    principal.require_admin()?;

    let name = required_name(&pairs)?;
    let collection = state
        .collection_service
        .update(&name, body.into_inner().data.columns)
        .await?;

    Ok(HttpResponse::Ok().json(DataResponse { data: collection }))
}

/// `POST /collections:destroy?name=…`
///
/// Drops the storage table with all its records.
pub async fn destroy(
    state: web::Data<AppState>,
    principal: Principal,
    pairs: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    principal.require_admin()?;

    let name = required_name(&pairs)?;
    state.collection_service.destroy(&name).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "collection deleted successfully".to_string(),
    }))
}
