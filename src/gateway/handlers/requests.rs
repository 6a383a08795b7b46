//! Resource request handlers

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::account::Role;
use crate::error::LibraryError;
use crate::gateway::state::AppState;
use crate::gateway::types::ApiResponse;
use crate::pagination::Page;
use crate::requests::{
    CreateRequestInput, RequestListParams, RequestStats, ResourceRequest, UpdateRequestInput,
};
use crate::user_auth::{Claims, require_role};

type HandlerResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), LibraryError>;

#[utoipa::path(
    post,
    path = "/api/v1/requests",
    request_body = CreateRequestInput,
    responses(
        (status = 201, description = "Request created"),
        (status = 422, description = "Invalid input")
    ),
    security(("bearer_auth" = [])),
    tag = "Requests"
)]
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<CreateRequestInput>,
) -> HandlerResult<ResourceRequest> {
    let request = state.requests.create(input, claims.user_id()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(request))))
}

/// Admins see every request; everyone else sees their own
#[utoipa::path(
    get,
    path = "/api/v1/requests",
    params(
        ("status" = Option<String>, Query, description = "OPEN | IN_PROGRESS | RESOLVED | REJECTED"),
        ("userId" = Option<Uuid>, Query, description = "Admins only"),
        ("page" = Option<i64>, Query, description = "Page number"),
        ("limit" = Option<i64>, Query, description = "Page size, max 100")
    ),
    responses((status = 200, description = "Request page")),
    security(("bearer_auth" = [])),
    tag = "Requests"
)]
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<RequestListParams>,
) -> HandlerResult<Page<ResourceRequest>> {
    let page = state
        .requests
        .find_all(params.into_query(), claims.actor())
        .await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(page))))
}

/// ADMIN only
#[utoipa::path(
    get,
    path = "/api/v1/requests/stats",
    responses(
        (status = 200, description = "Request counters", body = ApiResponse<RequestStats>),
        (status = 403, description = "Caller is not ADMIN")
    ),
    security(("bearer_auth" = [])),
    tag = "Requests"
)]
pub async fn request_stats(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> HandlerResult<RequestStats> {
    require_role(&claims, &[Role::Admin])?;
    let stats = state.requests.stats().await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(stats))))
}

#[utoipa::path(
    get,
    path = "/api/v1/requests/{id}",
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Request"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Requests"
)]
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> HandlerResult<ResourceRequest> {
    let request = state.requests.find_by_id(id, claims.actor()).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(request))))
}

/// ADMIN only: move the status and/or reply
#[utoipa::path(
    put,
    path = "/api/v1/requests/{id}",
    params(("id" = Uuid, Path, description = "Request id")),
    request_body = UpdateRequestInput,
    responses(
        (status = 200, description = "Request updated"),
        (status = 403, description = "Caller is not ADMIN"),
        (status = 404, description = "Request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Requests"
)]
pub async fn update_request(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateRequestInput>,
) -> HandlerResult<ResourceRequest> {
    require_role(&claims, &[Role::Admin])?;
    let request = state.requests.update(id, input, claims.user_id()).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(request))))
}

#[utoipa::path(
    delete,
    path = "/api/v1/requests/{id}",
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Request deleted"),
        (status = 403, description = "Not the owner, or already being processed"),
        (status = 404, description = "Request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Requests"
)]
pub async fn delete_request(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> HandlerResult<()> {
    state.requests.delete(id, claims.actor()).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(()))))
}
