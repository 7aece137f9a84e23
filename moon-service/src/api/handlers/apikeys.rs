//! # API Key Administration Handlers
//!
//! Admin-only CRUD over service credentials. Create and rotate are the
//! two key-revealing operations: their responses carry the plaintext
//! exactly once, together with a warning.

use actix_web::{web, HttpResponse};
use serde::Serialize;

use shared::auth::Principal;
use shared::errors::ApiError;
use shared::validation;

use crate::api::dto::{
    ApiKeyCreatedDto, ApiKeyDto, CreateApiKeyRequest, DataEnvelope, DataResponse,
    MessageResponse, UpdateApiKeyRequest,
};
use crate::api::query;
use crate::service::apikey_service::ApiKeyChanges;
use crate::AppState;

const KEY_WARNING: &str = "store this key securely; it will not be shown again";

/// Envelope for key-revealing responses: `{data, warning}`.
#[derive(Debug, Serialize)]
struct KeyRevealResponse {
    data: ApiKeyCreatedDto,
    warning: String,
}

fn required_id(pairs: &[(String, String)]) -> Result<String, ApiError> {
    query::parse_pairs(pairs)?
        .id
        .ok_or_else(|| ApiError::validation("the 'id' parameter is required"))
}

/// `GET /apikeys:list`
pub async fn list(
    state: web::Data<AppState>,
    principal: Principal,
) -> Result<HttpResponse, ApiError> {
    principal.require_admin()?;

    let keys = state.apikey_service.list().await?;
    let data: Vec<ApiKeyDto> = keys.into_iter().map(ApiKeyDto::from).collect();
    Ok(HttpResponse::Ok().json(DataResponse { data }))
}

/// `GET /apikeys:get?id=…`
pub async fn get(
    state: web::Data<AppState>,
    principal: Principal,
    pairs: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    principal.require_admin()?;

    let id = required_id(&pairs)?;
    let key = state.apikey_service.get(&id).await?;
    Ok(HttpResponse::Ok().json(DataResponse { data: ApiKeyDto::from(key) }))
}

/// `POST /apikeys:create`
pub async fn create(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<DataEnvelope<CreateApiKeyRequest>>,
) -> Result<HttpResponse, ApiError> {
    principal.require_admin()?;

    let request = body.into_inner().data;
    validation::validate_request(&request)?;

    let issued = state
        .apikey_service
        .create(
            &request.name,
            request.description,
            &request.role,
            request.can_write,
        )
        .await?;

    Ok(HttpResponse::Created().json(KeyRevealResponse {
        data: ApiKeyCreatedDto {
            info: ApiKeyDto::from(issued.key),
            key: issued.plaintext,
        },
        warning: KEY_WARNING.to_string(),
    }))
}

/// `POST /apikeys:update?id=…`
///
/// Metadata changes and/or `{"action": "rotate"}`. Rotation responds
/// with the fresh plaintext; a plain update responds with the projection
/// only.
pub async fn update(
    state: web::Data<AppState>,
    principal: Principal,
    pairs: web::Query<Vec<(String, String)>>,
    body: web::Json<DataEnvelope<UpdateApiKeyRequest>>,
) -> Result<HttpResponse, ApiError> {
    principal.require_admin()?;

    let id = required_id(&pairs)?;
    let request = body.into_inner().data;

    let (key, plaintext) = state
        .apikey_service
        .update(
            &id,
            ApiKeyChanges {
                name: request.name,
                description: request.description,
                role: request.role,
                can_write: request.can_write,
                action: request.action,
            },
        )
        .await?;

    match plaintext {
        Some(plaintext) => Ok(HttpResponse::Ok().json(KeyRevealResponse {
            data: ApiKeyCreatedDto {
                info: ApiKeyDto::from(key),
                key: plaintext,
            },
            warning: KEY_WARNING.to_string(),
        })),
        None => Ok(HttpResponse::Ok().json(DataResponse { data: ApiKeyDto::from(key) })),
    }
}

/// `POST /apikeys:destroy?id=…`
pub async fn destroy(
    state: web::Data<AppState>,
    principal: Principal,
    pairs: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    principal.require_admin()?;

    let id = required_id(&pairs)?;
    state.apikey_service.destroy(&id).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "API key deleted successfully".to_string(),
    }))
}
