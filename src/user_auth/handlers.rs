use axum::{Extension, Json, extract::State, http::StatusCode};
use std::sync::Arc;

use super::models::{
    AuthSession, Claims, LoginRequest, RefreshRequest, RegisterRequest, TokenPair,
};
use crate::account::User;
use crate::error::LibraryError;
use crate::gateway::{state::AppState, types::ApiResponse};

type HandlerResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), LibraryError>;

/// Register a new user
///
/// POST /api/v1/auth/register
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = ApiResponse<AuthSession>),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Invalid input")
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> HandlerResult<AuthSession> {
    let session = state.auth.register(req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(session))))
}

/// Login user
///
/// POST /api/v1/auth/login
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = ApiResponse<AuthSession>),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> HandlerResult<AuthSession> {
    let session = state.auth.login(req).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(session))))
}

/// Exchange a refresh token for a new pair
///
/// POST /api/v1/auth/refresh
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = ApiResponse<TokenPair>),
        (status = 401, description = "Refresh token invalid, expired or already used")
    ),
    tag = "Auth"
)]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> HandlerResult<TokenPair> {
    let tokens = state.auth.refresh(&req.refresh_token).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(tokens))))
}

/// Revoke every refresh token of the caller
///
/// POST /api/v1/auth/logout
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 200, description = "Logged out"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> HandlerResult<()> {
    state.auth.logout(claims.user_id()).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(()))))
}

/// Current user profile
///
/// GET /api/v1/auth/me
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<User>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> HandlerResult<User> {
    let user = state.auth.me(claims.user_id()).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(user))))
}
