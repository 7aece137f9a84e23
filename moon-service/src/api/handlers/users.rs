//! # User Administration Handlers
//!
//! Admin-only CRUD over user accounts. Mutations are keyed by `?id=`;
//! `create` and `update` carry a single object in the `{"data": …}`
//! envelope.

use actix_web::{web, HttpResponse};

use shared::auth::Principal;
use shared::errors::ApiError;
use shared::validation;

use crate::api::dto::{
    CreateUserRequest, DataEnvelope, DataResponse, MessageResponse, UpdateUserRequest, UserDto,
};
use crate::api::query;
use crate::service::user_service::UserChanges;
use crate::AppState;

fn required_id(pairs: &[(String, String)]) -> Result<String, ApiError> {
    query::parse_pairs(pairs)?
        .id
        .ok_or_else(|| ApiError::validation("the 'id' parameter is required"))
}

/// `GET /users:list`
pub async fn list(
    state: web::Data<AppState>,
    principal: Principal,
) -> Result<HttpResponse, ApiError> {
    principal.require_admin()?;

    let users = state.user_service.list().await?;
    let data: Vec<UserDto> = users.into_iter().map(UserDto::from).collect();
    Ok(HttpResponse::Ok().json(DataResponse { data }))
}

/// `GET /users:get?id=…`
pub async fn get(
    state: web::Data<AppState>,
    principal: Principal,
    pairs: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    principal.require_admin()?;

    let id = required_id(&pairs)?;
    let user = state.user_service.get(&id).await?;
    Ok(HttpResponse::Ok().json(DataResponse { data: UserDto::from(user) }))
}

/// `POST /users:create`
pub async fn create(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<DataEnvelope<CreateUserRequest>>,
) -> Result<HttpResponse, ApiError> {
    principal.require_admin()?;

    let request = body.into_inner().data;
    validation::validate_request(&request)?;

    let user = state
        .user_service
        .create(
            &request.username,
            &request.email,
            &request.password,
            &request.role,
            request.can_write,
        )
        .await?;

    Ok(HttpResponse::Created().json(DataResponse { data: UserDto::from(user) }))
}

/// `POST /users:update?id=…`
///
/// Field updates, password reset and the `revoke_sessions` action. The
/// self-modification and last-admin guards live in the service.
pub async fn update(
    state: web::Data<AppState>,
    principal: Principal,
    pairs: web::Query<Vec<(String, String)>>,
    body: web::Json<DataEnvelope<UpdateUserRequest>>,
) -> Result<HttpResponse, ApiError> {
    principal.require_admin()?;

    let id = required_id(&pairs)?;
    let request = body.into_inner().data;

    let user = state
        .user_service
        .update(
            &principal,
            &id,
            UserChanges {
                username: request.username,
                email: request.email,
                password: request.password,
                role: request.role,
                can_write: request.can_write,
                action: request.action,
            },
        )
        .await?;

    Ok(HttpResponse::Ok().json(DataResponse { data: UserDto::from(user) }))
}

/// `POST /users:destroy?id=…`
pub async fn destroy(
    state: web::Data<AppState>,
    principal: Principal,
    pairs: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    principal.require_admin()?;

    let id = required_id(&pairs)?;
    state.user_service.destroy(&principal, &id).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "user deleted successfully".to_string(),
    }))
}
