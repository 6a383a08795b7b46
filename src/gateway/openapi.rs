//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:5000/docs`
//! - OpenAPI JSON: `http://localhost:5000/api-docs/openapi.json`

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::account::{Role, User};
use crate::admin::UpdateRoleInput;
use crate::catalog::{AccessType, DeliveryGrant, NewCourse, ResourceCategory, ResourcePatch};
use crate::gateway::handlers::HealthResponse;
use crate::requests::{CreateRequestInput, RequestStats, RequestStatus, UpdateRequestInput};
use crate::user_auth::{
    AuthSession, LoginRequest, RefreshRequest, RegisterRequest, TokenPair,
};

/// Access tokens from `/api/v1/auth/login`
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let mut scheme = Http::new(HttpAuthScheme::Bearer);
            scheme.bearer_format = Some("JWT".to_string());
            scheme.description =
                Some("Access token (15 minutes). Renew with POST /api/v1/auth/refresh.".to_string());
            components.add_security_scheme("bearer_auth", SecurityScheme::Http(scheme));
        }
    }
}

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "E-Library API",
        version = "1.0.0",
        description = "Course resources with signed delivery, resource requests and audited administration.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:5000", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health::health_check,
        // Auth
        crate::user_auth::handlers::register,
        crate::user_auth::handlers::login,
        crate::user_auth::handlers::refresh,
        crate::user_auth::handlers::logout,
        crate::user_auth::handlers::me,
        // Resources
        crate::gateway::handlers::resources::list_resources,
        crate::gateway::handlers::resources::get_trending,
        crate::gateway::handlers::resources::get_latest,
        crate::gateway::handlers::resources::get_resource,
        crate::gateway::handlers::resources::create_resource,
        crate::gateway::handlers::resources::update_resource,
        crate::gateway::handlers::resources::delete_resource,
        crate::gateway::handlers::resources::download_resource,
        crate::gateway::handlers::resources::preview_resource,
        // Courses
        crate::gateway::handlers::courses::list_courses,
        crate::gateway::handlers::courses::create_course,
        // Requests
        crate::gateway::handlers::requests::create_request,
        crate::gateway::handlers::requests::list_requests,
        crate::gateway::handlers::requests::request_stats,
        crate::gateway::handlers::requests::get_request,
        crate::gateway::handlers::requests::update_request,
        crate::gateway::handlers::requests::delete_request,
        // Admin
        crate::gateway::handlers::admin::list_users,
        crate::gateway::handlers::admin::get_user,
        crate::gateway::handlers::admin::update_user_role,
        crate::gateway::handlers::admin::delete_user,
        crate::gateway::handlers::admin::get_metrics,
        crate::gateway::handlers::admin::get_audit_logs,
    ),
    components(
        schemas(
            HealthResponse,
            Role,
            User,
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            TokenPair,
            AuthSession,
            ResourceCategory,
            AccessType,
            ResourcePatch,
            NewCourse,
            DeliveryGrant,
            RequestStatus,
            CreateRequestInput,
            UpdateRequestInput,
            RequestStats,
            UpdateRoleInput,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and token rotation"),
        (name = "Resources", description = "Catalog, uploads and signed delivery"),
        (name = "Courses", description = "Course list for resource association"),
        (name = "Requests", description = "Requests for missing resources"),
        (name = "Admin", description = "User management, metrics and audit trail (ADMIN only)"),
        (name = "System", description = "Health checks and system info")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::OpenApi;

    #[test]
    fn test_openapi_spec_generates() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "E-Library API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn test_openapi_json_serializable() {
        let spec = ApiDoc::openapi();
        let json_str = spec.to_json().unwrap();
        assert!(json_str.contains("E-Library API"));
    }

    #[test]
    fn test_endpoints_registered() {
        let paths = ApiDoc::openapi().paths.paths;
        assert!(paths.contains_key("/api/v1/health"));
        assert!(paths.contains_key("/api/v1/auth/refresh"));
        assert!(paths.contains_key("/api/v1/resources/{id}/download"));
        assert!(paths.contains_key("/api/v1/requests/stats"));
        assert!(paths.contains_key("/api/v1/admin/audit-logs"));
    }

    #[test]
    fn test_security_scheme_registered() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("should have components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
