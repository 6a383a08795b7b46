//! Resource catalog and delivery handlers

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use std::sync::Arc;
use uuid::Uuid;

use super::helpers::{ClientIp, LimitParams, MaybeClaims, access_context};
use crate::account::Role;
use crate::catalog::{
    DEFAULT_SHOWCASE_LIMIT, DeliveryGrant, LatestResource, ResourceDetail, ResourceListItem,
    ResourcePatch, ResourceQuery, TrendingResource,
};
use crate::error::LibraryError;
use crate::gateway::state::AppState;
use crate::gateway::types::{ApiResponse, ResourceUpload};
use crate::pagination::Page;
use crate::user_auth::{Claims, require_role};

type HandlerResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), LibraryError>;

fn ok<T>(data: T) -> HandlerResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

/// List active resources
///
/// Offset pagination by default; passing `cursor` switches to cursor mode
/// (no total). Free-text searches are rate limited per client IP.
#[utoipa::path(
    get,
    path = "/api/v1/resources",
    params(
        ("search" = Option<String>, Query, description = "Case-insensitive title/description match"),
        ("category" = Option<String>, Query, description = "BOOK | JOURNAL | PAPER | MAGAZINE | THESIS | OTHER"),
        ("department" = Option<String>, Query, description = "Substring match"),
        ("year" = Option<i32>, Query, description = "Exact publication year"),
        ("tag" = Option<String>, Query, description = "Tag membership"),
        ("author" = Option<String>, Query, description = "Author membership"),
        ("accessType" = Option<String>, Query, description = "VIEW_ONLY | DOWNLOADABLE"),
        ("page" = Option<i64>, Query, description = "Page number (offset mode)"),
        ("limit" = Option<i64>, Query, description = "Page size, max 100"),
        ("cursor" = Option<Uuid>, Query, description = "Last id of the previous page (cursor mode)"),
        ("sortBy" = Option<String>, Query, description = "createdAt | title | downloadCount | viewCount"),
        ("sortOrder" = Option<String>, Query, description = "asc | desc")
    ),
    responses(
        (status = 200, description = "Resource page"),
        (status = 429, description = "Too many searches")
    ),
    tag = "Resources"
)]
pub async fn list_resources(
    State(state): State<Arc<AppState>>,
    ip: ClientIp,
    caller: MaybeClaims,
    Query(query): Query<ResourceQuery>,
) -> HandlerResult<Page<ResourceListItem>> {
    if query.search_term().is_some() {
        state.search_limiter.check(ip.key())?;
    }
    ok(state.resources.find_all(&query, caller.user_id()).await?)
}

/// Most downloaded active resources
#[utoipa::path(
    get,
    path = "/api/v1/resources/trending",
    params(("limit" = Option<i64>, Query, description = "Default 10")),
    responses((status = 200, description = "Trending resources")),
    tag = "Resources"
)]
pub async fn get_trending(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> HandlerResult<Vec<TrendingResource>> {
    let limit = params.limit_or(DEFAULT_SHOWCASE_LIMIT);
    ok(state.resources.get_trending(limit).await?)
}

/// Newest active resources
#[utoipa::path(
    get,
    path = "/api/v1/resources/latest",
    params(("limit" = Option<i64>, Query, description = "Default 10")),
    responses((status = 200, description = "Latest resources")),
    tag = "Resources"
)]
pub async fn get_latest(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> HandlerResult<Vec<LatestResource>> {
    let limit = params.limit_or(DEFAULT_SHOWCASE_LIMIT);
    ok(state.resources.get_latest(limit).await?)
}

#[utoipa::path(
    get,
    path = "/api/v1/resources/{id}",
    params(("id" = Uuid, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Resource with uploader and courses"),
        (status = 404, description = "Resource not found")
    ),
    tag = "Resources"
)]
pub async fn get_resource(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<ResourceDetail> {
    ok(state.resources.find_by_id(id).await?)
}

/// Upload a resource (multipart). STAFF and ADMIN only.
#[utoipa::path(
    post,
    path = "/api/v1/resources",
    request_body(content_type = "multipart/form-data", description = "Metadata fields plus `file` and optional `coverImage`"),
    responses(
        (status = 201, description = "Resource created"),
        (status = 403, description = "Caller is not STAFF or ADMIN"),
        (status = 422, description = "Invalid metadata or file")
    ),
    security(("bearer_auth" = [])),
    tag = "Resources"
)]
pub async fn create_resource(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    upload: ResourceUpload,
) -> HandlerResult<ResourceDetail> {
    require_role(&claims, &[Role::Staff, Role::Admin])?;
    let detail = state
        .resources
        .create(upload.metadata, upload.file, upload.cover, claims.user_id())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(detail))))
}

#[utoipa::path(
    put,
    path = "/api/v1/resources/{id}",
    params(("id" = Uuid, Path, description = "Resource id")),
    request_body = ResourcePatch,
    responses(
        (status = 200, description = "Resource updated"),
        (status = 403, description = "Not the uploader, STAFF or ADMIN"),
        (status = 404, description = "Resource not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Resources"
)]
pub async fn update_resource(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(patch): Json<ResourcePatch>,
) -> HandlerResult<ResourceDetail> {
    ok(state.resources.update(id, patch, claims.actor()).await?)
}

/// ADMIN only
#[utoipa::path(
    delete,
    path = "/api/v1/resources/{id}",
    params(("id" = Uuid, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Resource deleted"),
        (status = 403, description = "Caller is not ADMIN"),
        (status = 404, description = "Resource not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Resources"
)]
pub async fn delete_resource(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> HandlerResult<()> {
    require_role(&claims, &[Role::Admin])?;
    state.resources.delete(id, claims.user_id()).await?;
    ok(())
}

/// Signed download URL (1 hour). Counts one download.
#[utoipa::path(
    post,
    path = "/api/v1/resources/{id}/download",
    params(("id" = Uuid, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Signed URL", body = ApiResponse<DeliveryGrant>),
        (status = 400, description = "Resource has no file"),
        (status = 403, description = "Resource is view-only"),
        (status = 429, description = "Too many downloads")
    ),
    security(("bearer_auth" = [])),
    tag = "Resources"
)]
pub async fn download_resource(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ip: ClientIp,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> HandlerResult<DeliveryGrant> {
    state
        .download_limiter
        .check(&claims.user_id().to_string())?;
    let context = access_context(ip, &headers);
    ok(state
        .delivery
        .request_download(id, claims.user_id(), context)
        .await?)
}

/// Signed preview URL (30 minutes). Anonymous callers allowed.
#[utoipa::path(
    get,
    path = "/api/v1/resources/{id}/preview",
    params(("id" = Uuid, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Signed URL", body = ApiResponse<DeliveryGrant>),
        (status = 400, description = "Resource has no file"),
        (status = 404, description = "Resource not found")
    ),
    tag = "Resources"
)]
pub async fn preview_resource(
    State(state): State<Arc<AppState>>,
    caller: MaybeClaims,
    Path(id): Path<Uuid>,
) -> HandlerResult<DeliveryGrant> {
    ok(state.delivery.request_preview(id, caller.user_id()).await?)
}
