//! Admin handlers. The whole router is behind `require_admin`.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::account::{User, UserSummary};
use crate::admin::{AuditListParams, Metrics, UpdateRoleInput, UserListParams};
use crate::audit::AuditLog;
use crate::error::LibraryError;
use crate::gateway::state::AppState;
use crate::gateway::types::ApiResponse;
use crate::pagination::Page;
use crate::user_auth::Claims;

type HandlerResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), LibraryError>;

#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    params(
        ("role" = Option<String>, Query, description = "STUDENT | STAFF | ADMIN"),
        ("search" = Option<String>, Query, description = "Name or email substring"),
        ("page" = Option<i64>, Query, description = "Page number"),
        ("limit" = Option<i64>, Query, description = "Page size, max 100"),
        ("sortBy" = Option<String>, Query, description = "createdAt | name | email | role"),
        ("sortOrder" = Option<String>, Query, description = "asc | desc")
    ),
    responses((status = 200, description = "Users with activity counts")),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserListParams>,
) -> HandlerResult<Page<UserSummary>> {
    let page = state.admin.get_users(&params.into_query()).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(page))))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User with activity counts"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<UserSummary> {
    let user = state.admin.get_user_by_id(id).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(user))))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateRoleInput,
    responses(
        (status = 200, description = "Role updated", body = ApiResponse<User>),
        (status = 400, description = "Cannot change your own role"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_user_role(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateRoleInput>,
) -> HandlerResult<User> {
    let user = state
        .admin
        .update_user_role(id, input.role, claims.user_id())
        .await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(user))))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 400, description = "Own account or last admin"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> HandlerResult<()> {
    state.admin.delete_user(id, claims.user_id()).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(()))))
}

/// Cached dashboard snapshot
#[utoipa::path(
    get,
    path = "/api/v1/admin/metrics",
    responses((status = 200, description = "Dashboard metrics")),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> HandlerResult<Metrics> {
    let metrics = state.admin.get_metrics().await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(metrics))))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/audit-logs",
    params(
        ("entity" = Option<String>, Query, description = "User | Resource | Request"),
        ("action" = Option<String>, Query, description = "CREATE | UPDATE | UPDATE_ROLE | DELETE"),
        ("userId" = Option<Uuid>, Query, description = "Performer"),
        ("startDate" = Option<String>, Query, description = "RFC 3339, inclusive"),
        ("endDate" = Option<String>, Query, description = "RFC 3339, inclusive"),
        ("page" = Option<i64>, Query, description = "Page number"),
        ("limit" = Option<i64>, Query, description = "Page size, max 100")
    ),
    responses((status = 200, description = "Audit entries, newest first")),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn get_audit_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditListParams>,
) -> HandlerResult<Page<AuditLog>> {
    let page = state.admin.get_audit_logs(&params.into_query()).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(page))))
}
