//! # Auth Handlers
//!
//! Login, refresh, logout, profile and self-service password change.
//!
//! | Route | Auth | Notes |
//! |-------|------|-------|
//! | `POST /auth:login` | public | login limiter keyed by (ip, username) |
//! | `POST /auth:refresh` | public | single-use token rotation |
//! | `POST /auth:logout` | bearer | blacklists the presented access token |
//! | `GET /auth:me` | bearer | principal profile (user or API key) |
//! | `POST /auth:change-password` | bearer (user) | revokes all sessions |
//!
//! Auth endpoints take the credential block directly (no `{"data": …}`
//! envelope).

use actix_web::{web, HttpRequest, HttpResponse};

use shared::auth::{Principal, PrincipalType};
use shared::errors::ApiError;
use shared::validation;

use crate::api::dto::{
    ApiKeyDto, ChangePasswordRequest, LoginRequest, LogoutRequest, MessageResponse,
    RefreshRequest, TokenDto, UserDto,
};
use crate::api::middleware::BearerToken;
use crate::AppState;

/// `POST /auth:login`
///
/// The client IP participates in the brute-force window, so it is taken
/// from the connection info (behind a proxy, the forwarded address).
pub async fn login(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let ip = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();

    let tokens = state
        .auth_service
        .login(&body.username, &body.password, &ip)
        .await?;

    Ok(HttpResponse::Ok().json(crate::api::dto::DataResponse {
        data: token_dto(tokens),
    }))
}

/// `POST /auth:refresh`
pub async fn refresh(
    state: web::Data<AppState>,
    body: web::Json<RefreshRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let tokens = state.auth_service.refresh(&body.refresh_token).await?;

    Ok(HttpResponse::Ok().json(crate::api::dto::DataResponse {
        data: token_dto(tokens),
    }))
}

/// `POST /auth:logout`
///
/// The body is optional; when it carries the refresh token, that row is
/// deleted as well.
pub async fn logout(
    state: web::Data<AppState>,
    _principal: Principal,
    token: BearerToken,
    body: Option<web::Json<LogoutRequest>>,
) -> Result<HttpResponse, ApiError> {
    let refresh_token = body.and_then(|body| body.into_inner().refresh_token);

    state
        .auth_service
        .logout(&token.0, refresh_token.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "logged out successfully".to_string(),
    }))
}

/// `GET /auth:me`
pub async fn me(
    state: web::Data<AppState>,
    principal: Principal,
) -> Result<HttpResponse, ApiError> {
    match principal.principal_type {
        PrincipalType::User => {
            // A 404 here means the token outlived its user
            let user = state
                .user_service
                .get(&principal.id)
                .await
                .map_err(|_| ApiError::InvalidToken)?;
            Ok(HttpResponse::Ok().json(crate::api::dto::DataResponse {
                data: UserDto::from(user),
            }))
        }
        PrincipalType::ApiKey => {
            let key = state
                .apikey_service
                .get(&principal.id)
                .await
                .map_err(|_| ApiError::InvalidToken)?;
            Ok(HttpResponse::Ok().json(crate::api::dto::DataResponse {
                data: ApiKeyDto::from(key),
            }))
        }
    }
}

/// `POST /auth:change-password`
///
/// Users only; API keys have no password. Success revokes every refresh
/// token and blacklists the presented access token.
pub async fn change_password(
    state: web::Data<AppState>,
    principal: Principal,
    token: BearerToken,
    body: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    if principal.principal_type != PrincipalType::User {
        return Err(ApiError::AuthenticationRequired);
    }

    let body = body.into_inner();
    validation::validate_request(&body)?;

    state
        .auth_service
        .change_password(&principal, &body.current_password, &body.new_password, &token.0)
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "password changed successfully".to_string(),
    }))
}

fn token_dto(tokens: crate::service::auth_service::AuthTokens) -> TokenDto {
    TokenDto {
        token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: tokens.expires_in,
        user: UserDto::from(tokens.user),
    }
}
