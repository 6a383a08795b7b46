//! Store traits
//!
//! The services only see these traits. Every mutation that carries an
//! [`AuditEntry`] writes it in the same transaction as the change.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::account::{NewUser, Role, User, UserCredentials, UserQuery, UserSummary};
use crate::admin::Metrics;
use crate::audit::{AuditEntry, AuditLog, AuditQuery};
use crate::catalog::{
    CourseSummary, DownloadLog, LatestResource, NewCourse, NewResource, Resource, ResourceDetail,
    ResourceListItem, ResourcePatch, ResourceQuery, TrendingResource,
};
use crate::error::LibraryResult;
use crate::pagination::Page;
use crate::requests::{NewRequest, RequestPatch, RequestQuery, RequestStats, ResourceRequest};
use crate::user_auth::RefreshTokenRecord;

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Insert the row, its course links (duplicates skipped) and the audit row
    async fn insert_resource(
        &self,
        resource: &NewResource,
        course_ids: &[Uuid],
        audit: &AuditEntry,
    ) -> LibraryResult<ResourceDetail>;

    /// With uploader and courses, regardless of `isActive`
    async fn find_resource(&self, id: Uuid) -> LibraryResult<Option<ResourceDetail>>;

    async fn get_resource(&self, id: Uuid) -> LibraryResult<Option<Resource>>;

    /// Active resources only. Offset mode counts; cursor mode over-fetches by one.
    async fn list_resources(&self, query: &ResourceQuery) -> LibraryResult<Page<ResourceListItem>>;

    /// `patch.course_ids`, when present, replaces the association set
    async fn update_resource(
        &self,
        id: Uuid,
        patch: &ResourcePatch,
        audit: &AuditEntry,
    ) -> LibraryResult<ResourceDetail>;

    async fn delete_resource(&self, id: Uuid, audit: &AuditEntry) -> LibraryResult<()>;

    /// Insert the log row and bump `downloadCount` atomically
    async fn record_download(&self, log: &DownloadLog) -> LibraryResult<()>;

    async fn increment_view_count(&self, id: Uuid) -> LibraryResult<()>;

    async fn trending(&self, limit: i64) -> LibraryResult<Vec<TrendingResource>>;

    async fn latest(&self, limit: i64) -> LibraryResult<Vec<LatestResource>>;

    async fn record_search(
        &self,
        user_id: Option<Uuid>,
        query: &str,
        result_count: i64,
    ) -> LibraryResult<()>;
}

#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn insert_course(&self, course: &NewCourse) -> LibraryResult<CourseSummary>;

    async fn list_courses(&self) -> LibraryResult<Vec<CourseSummary>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// `Conflict` on duplicate email
    async fn insert_user(&self, user: &NewUser) -> LibraryResult<User>;

    async fn find_user(&self, id: Uuid) -> LibraryResult<Option<User>>;

    async fn find_credentials(&self, email: &str) -> LibraryResult<Option<UserCredentials>>;

    /// With activity counts including searches
    async fn user_summary(&self, id: Uuid) -> LibraryResult<Option<UserSummary>>;

    async fn list_users(&self, query: &UserQuery) -> LibraryResult<Page<UserSummary>>;

    async fn update_user_role(&self, id: Uuid, role: Role, audit: &AuditEntry)
    -> LibraryResult<User>;

    /// Locks the admin rows and refuses to remove the last ADMIN
    async fn delete_user(&self, id: Uuid, audit: &AuditEntry) -> LibraryResult<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> LibraryResult<()>;

    /// Revoke `old_jti` and store `next` in one step. `false` when `old_jti`
    /// is unknown, expired or already revoked.
    async fn rotate_refresh_token(
        &self,
        old_jti: Uuid,
        next: &RefreshTokenRecord,
    ) -> LibraryResult<bool>;

    /// Revoke every live refresh token of a user; returns how many were live
    async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> LibraryResult<u64>;
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert_request(
        &self,
        request: &NewRequest,
        audit: &AuditEntry,
    ) -> LibraryResult<ResourceRequest>;

    async fn find_request(&self, id: Uuid) -> LibraryResult<Option<ResourceRequest>>;

    async fn list_requests(&self, query: &RequestQuery) -> LibraryResult<Page<ResourceRequest>>;

    async fn update_request(
        &self,
        id: Uuid,
        patch: &RequestPatch,
        audit: &AuditEntry,
    ) -> LibraryResult<ResourceRequest>;

    /// With `require_open`, a request that left OPEN is not deleted (`Forbidden`)
    async fn delete_request(
        &self,
        id: Uuid,
        require_open: bool,
        audit: &AuditEntry,
    ) -> LibraryResult<()>;

    async fn request_stats(&self, recent_since: DateTime<Utc>) -> LibraryResult<RequestStats>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Newest first, with performer summary
    async fn list_audit_logs(&self, query: &AuditQuery) -> LibraryResult<Page<AuditLog>>;
}

#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn collect_metrics(&self, recent_since: DateTime<Utc>) -> LibraryResult<Metrics>;
}

/// Everything the services need from persistence
pub trait LibraryStore:
    ResourceStore + CourseStore + UserStore + SessionStore + RequestStore + AuditStore + MetricsStore
{
}

impl<T> LibraryStore for T where
    T: ResourceStore
        + CourseStore
        + UserStore
        + SessionStore
        + RequestStore
        + AuditStore
        + MetricsStore
{
}
