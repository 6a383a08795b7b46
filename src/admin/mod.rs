//! Administration: users, metrics, audit listing

pub mod models;
pub mod service;

pub use models::{
    AuditListParams, DownloadMetrics, METRICS_RECENT_DAYS, METRICS_TOP_N, Metrics,
    RequestMetrics, ResourceMetrics, SearchMetrics, SearchTerm, TopResource, UpdateRoleInput,
    UserListParams, UserMetrics,
};
pub use service::AdminService;
