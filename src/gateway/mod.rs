pub mod handlers;
pub mod openapi;
pub mod rate_limit;
pub mod state;
pub mod types;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::GatewayConfig;
use crate::user_auth::{self, jwt_auth_middleware, optional_auth_middleware, require_admin};
use handlers::{admin, courses, requests, resources};
use state::AppState;

/// Multipart parts other than the two files
const FORM_FIELDS_ALLOWANCE: usize = 1024 * 1024;

/// Build the `/api/v1` router plus Swagger UI
pub fn build_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(user_auth::handlers::register))
        .route("/login", post(user_auth::handlers::login))
        .route("/refresh", post(user_auth::handlers::refresh))
        .merge(
            Router::new()
                .route("/logout", post(user_auth::handlers::logout))
                .route("/me", get(user_auth::handlers::me))
                .layer(from_fn_with_state(state.clone(), jwt_auth_middleware)),
        );

    // Anonymous callers allowed; a valid bearer is still picked up
    let public_routes = Router::new()
        .route("/resources", get(resources::list_resources))
        .route("/resources/trending", get(resources::get_trending))
        .route("/resources/latest", get(resources::get_latest))
        .route("/resources/{id}", get(resources::get_resource))
        .route("/resources/{id}/preview", get(resources::preview_resource))
        .route("/courses", get(courses::list_courses))
        .layer(from_fn_with_state(state.clone(), optional_auth_middleware));

    let upload_limit = state.uploads.max_document_bytes
        + state.uploads.max_cover_bytes
        + FORM_FIELDS_ALLOWANCE;
    let private_routes = Router::new()
        .route(
            "/resources",
            post(resources::create_resource).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/resources/{id}",
            axum::routing::put(resources::update_resource).delete(resources::delete_resource),
        )
        .route("/resources/{id}/download", post(resources::download_resource))
        .route("/courses", post(courses::create_course))
        .route(
            "/requests",
            get(requests::list_requests).post(requests::create_request),
        )
        .route("/requests/stats", get(requests::request_stats))
        .route(
            "/requests/{id}",
            get(requests::get_request)
                .put(requests::update_request)
                .delete(requests::delete_request),
        )
        .layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route(
            "/users/{id}",
            get(admin::get_user).delete(admin::delete_user),
        )
        .route("/users/{id}/role", axum::routing::put(admin::update_user_role))
        .route("/metrics", get(admin::get_metrics))
        .route("/audit-logs", get(admin::get_audit_logs))
        // Layers run bottom-up: authenticate, then check the role
        .layer(from_fn(require_admin))
        .layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    let api = Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/auth", auth_routes)
        .nest("/admin", admin_routes)
        .merge(public_routes)
        .merge(private_routes);

    Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Start the HTTP gateway and serve until the process is stopped
pub async fn run_server(config: &GatewayConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(%addr, error = %e, "Failed to bind; the port may already be in use");
        e
    })?;

    tracing::info!(%addr, "Gateway listening");
    tracing::info!("API Docs: http://{}/docs", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
