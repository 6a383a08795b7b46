use axum::{Extension, Json, extract::State, http::StatusCode};
use std::sync::Arc;

use crate::account::Role;
use crate::catalog::{CourseSummary, NewCourse};
use crate::error::LibraryError;
use crate::gateway::state::AppState;
use crate::gateway::types::ApiResponse;
use crate::user_auth::{Claims, require_role};

#[utoipa::path(
    get,
    path = "/api/v1/courses",
    responses((status = 200, description = "Courses ordered by code")),
    tag = "Courses"
)]
pub async fn list_courses(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<CourseSummary>>>), LibraryError> {
    let courses = state.resources.list_courses().await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(courses))))
}

/// STAFF and ADMIN only
#[utoipa::path(
    post,
    path = "/api/v1/courses",
    request_body = NewCourse,
    responses(
        (status = 201, description = "Course created"),
        (status = 403, description = "Caller is not STAFF or ADMIN"),
        (status = 409, description = "Course code already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Courses"
)]
pub async fn create_course(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(course): Json<NewCourse>,
) -> Result<(StatusCode, Json<ApiResponse<CourseSummary>>), LibraryError> {
    require_role(&claims, &[Role::Staff, Role::Admin])?;
    let created = state.resources.create_course(course).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}
