//! In-memory store
//!
//! Runs the service without PostgreSQL (local simulation) and backs the
//! service tests. One mutex guards all tables, so each operation is atomic
//! the same way a transaction is: the audit row and the change it documents
//! land together or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::store::{
    AuditStore, CourseStore, MetricsStore, RequestStore, ResourceStore, SessionStore, UserStore,
};
use crate::account::{
    NewUser, Role, User, UserActivityCounts, UserCredentials, UserQuery, UserRef, UserSortField,
    UserSummary,
};
use crate::admin::{
    DownloadMetrics, METRICS_TOP_N, Metrics, RequestMetrics, ResourceMetrics, SearchMetrics,
    SearchTerm, TopResource, UserMetrics,
};
use crate::audit::{AuditEntry, AuditLog, AuditPerformer, AuditQuery};
use crate::catalog::{
    CourseSummary, DownloadLog, LatestResource, NewCourse, NewResource, Resource, ResourceDetail,
    ResourceListItem, ResourcePatch, ResourceQuery, ResourceSortField, TrendingResource,
};
use crate::error::{LibraryError, LibraryResult};
use crate::pagination::{CursorPagination, Page, Pagination, SortOrder};
use crate::requests::{
    NewRequest, RequestPatch, RequestQuery, RequestSortField, RequestStats, RequestStatus,
    ResourceRequest,
};
use crate::user_auth::RefreshTokenRecord;

const FK_VIOLATION: &str = "Referenced record is missing or still in use";

#[derive(Debug, Clone)]
struct SearchLogRow {
    user_id: Option<Uuid>,
    query: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RefreshRow {
    record: RefreshTokenRecord,
    revoked_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserCredentials>,
    courses: HashMap<Uuid, CourseSummary>,
    resources: HashMap<Uuid, Resource>,
    /// (resource_id, course_id)
    course_links: BTreeSet<(Uuid, Uuid)>,
    download_logs: Vec<DownloadLog>,
    search_logs: Vec<SearchLogRow>,
    requests: HashMap<Uuid, ResourceRequest>,
    audit_logs: Vec<AuditLog>,
    refresh_tokens: HashMap<Uuid, RefreshRow>,
}

impl Tables {
    fn append_audit(&mut self, entry: &AuditEntry) {
        self.audit_logs.push(AuditLog {
            id: Uuid::new_v4(),
            entity: entry.entity,
            entity_id: entry.entity_id,
            action: entry.action,
            performed_by_id: entry.performed_by_id,
            meta: entry.meta.clone(),
            timestamp: Utc::now(),
            performed_by: None,
        });
    }

    fn user_ref(&self, id: Uuid, with_email: bool) -> UserRef {
        match self.users.get(&id) {
            Some(c) => UserRef {
                id,
                name: c.user.name.clone(),
                email: with_email.then(|| c.user.email.clone()),
            },
            None => UserRef {
                id,
                name: String::new(),
                email: None,
            },
        }
    }

    fn check_courses(&self, course_ids: &[Uuid]) -> LibraryResult<()> {
        if course_ids.iter().all(|id| self.courses.contains_key(id)) {
            Ok(())
        } else {
            Err(LibraryError::BadRequest(FK_VIOLATION.to_string()))
        }
    }

    fn detail(&self, resource: &Resource) -> ResourceDetail {
        let mut courses: Vec<CourseSummary> = self
            .course_links
            .iter()
            .filter(|(r, _)| *r == resource.id)
            .filter_map(|(_, course_id)| self.courses.get(course_id).cloned())
            .collect();
        courses.sort_by(|a, b| a.code.cmp(&b.code));
        ResourceDetail {
            resource: resource.clone(),
            uploaded_by: self.user_ref(resource.uploaded_by_id, true),
            courses,
        }
    }

    fn counts(&self, user_id: Uuid, with_searches: bool) -> UserActivityCounts {
        UserActivityCounts {
            uploaded_resources: self
                .resources
                .values()
                .filter(|r| r.uploaded_by_id == user_id)
                .count() as i64,
            download_logs: self
                .download_logs
                .iter()
                .filter(|l| l.user_id == user_id)
                .count() as i64,
            requests: self
                .requests
                .values()
                .filter(|r| r.user_id == user_id)
                .count() as i64,
            search_logs: with_searches.then(|| {
                self.search_logs
                    .iter()
                    .filter(|l| l.user_id == Some(user_id))
                    .count() as i64
            }),
        }
    }
}

fn compare_resources(field: ResourceSortField, a: &Resource, b: &Resource) -> Ordering {
    let primary = match field {
        ResourceSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        ResourceSortField::Title => a.title.cmp(&b.title),
        ResourceSortField::DownloadCount => a.download_count.cmp(&b.download_count),
        ResourceSortField::ViewCount => a.view_count.cmp(&b.view_count),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

fn directed(order: SortOrder, ord: Ordering) -> Ordering {
    match order {
        SortOrder::Asc => ord,
        SortOrder::Desc => ord.reverse(),
    }
}

fn paginate<T>(rows: Vec<T>, offset: i64, limit: i64) -> Vec<T> {
    rows.into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    // === Inspection (simulation and tests) ===

    pub fn download_log_count(&self, resource_id: Uuid) -> usize {
        self.lock()
            .download_logs
            .iter()
            .filter(|l| l.resource_id == resource_id)
            .count()
    }

    pub fn audit_logs_for(&self, entity_id: Uuid) -> Vec<AuditLog> {
        self.lock()
            .audit_logs
            .iter()
            .filter(|l| l.entity_id == entity_id)
            .cloned()
            .collect()
    }

    pub fn audit_log_len(&self) -> usize {
        self.lock().audit_logs.len()
    }

    pub fn search_log_len(&self) -> usize {
        self.lock().search_logs.len()
    }

    pub fn course_ids_of(&self, resource_id: Uuid) -> BTreeSet<Uuid> {
        self.lock()
            .course_links
            .iter()
            .filter(|(r, _)| *r == resource_id)
            .map(|(_, c)| *c)
            .collect()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn insert_resource(
        &self,
        resource: &NewResource,
        course_ids: &[Uuid],
        audit: &AuditEntry,
    ) -> LibraryResult<ResourceDetail> {
        let mut t = self.lock();
        if t.resources.contains_key(&resource.id) {
            return Err(LibraryError::Conflict("Record already exists".to_string()));
        }
        if !t.users.contains_key(&resource.uploaded_by_id) {
            return Err(LibraryError::BadRequest(FK_VIOLATION.to_string()));
        }
        t.check_courses(course_ids)?;

        let now = Utc::now();
        let row = Resource {
            id: resource.id,
            title: resource.title.clone(),
            description: resource.description.clone(),
            authors: resource.authors.clone(),
            category: resource.category,
            department: resource.department.clone(),
            publication_year: resource.publication_year,
            access_type: resource.access_type,
            tags: resource.tags.clone(),
            is_active: true,
            download_count: 0,
            view_count: 0,
            cloudinary_id: resource.file.as_ref().map(|b| b.public_id.clone()),
            cloudinary_url: resource.file.as_ref().map(|b| b.secure_url.clone()),
            cover_image_id: resource.cover.as_ref().map(|b| b.public_id.clone()),
            cover_image_url: resource.cover.as_ref().map(|b| b.secure_url.clone()),
            file_type: resource.file_type.clone(),
            file_size: resource.file_size,
            uploaded_by_id: resource.uploaded_by_id,
            created_at: now,
            updated_at: now,
        };
        t.resources.insert(row.id, row.clone());
        for course_id in course_ids {
            t.course_links.insert((row.id, *course_id));
        }
        t.append_audit(audit);
        Ok(t.detail(&row))
    }

    async fn find_resource(&self, id: Uuid) -> LibraryResult<Option<ResourceDetail>> {
        let t = self.lock();
        Ok(t.resources.get(&id).map(|r| t.detail(r)))
    }

    async fn get_resource(&self, id: Uuid) -> LibraryResult<Option<Resource>> {
        Ok(self.lock().resources.get(&id).cloned())
    }

    async fn list_resources(&self, query: &ResourceQuery) -> LibraryResult<Page<ResourceListItem>> {
        let t = self.lock();
        let window = query.window();
        let field = query.sort_by;
        let order = query.sort_order;

        let mut rows: Vec<&Resource> = t.resources.values().filter(|r| query.matches(r)).collect();
        rows.sort_by(|a, b| directed(order, compare_resources(field, a, b)));

        let to_item = |r: &Resource| ResourceListItem {
            resource: r.clone(),
            uploaded_by: t.user_ref(r.uploaded_by_id, false),
        };

        if let Some(cursor) = query.cursor {
            let anchor = t
                .resources
                .get(&cursor)
                .ok_or_else(|| LibraryError::BadRequest("Invalid cursor".to_string()))?;
            let mut page: Vec<ResourceListItem> = rows
                .into_iter()
                .filter(|r| directed(order, compare_resources(field, r, anchor)) == Ordering::Greater)
                .take(window.limit as usize + 1)
                .map(to_item)
                .collect();
            let pagination =
                CursorPagination::from_overfetch(&mut page, window.limit, |item| item.resource.id);
            return Ok(Page {
                data: page,
                pagination: Pagination::Cursor(pagination),
            });
        }

        let total = rows.len() as i64;
        let data = paginate(rows, window.offset(), window.limit)
            .into_iter()
            .map(to_item)
            .collect();
        Ok(Page::offset(data, window, total))
    }

    async fn update_resource(
        &self,
        id: Uuid,
        patch: &ResourcePatch,
        audit: &AuditEntry,
    ) -> LibraryResult<ResourceDetail> {
        let mut t = self.lock();
        if !t.resources.contains_key(&id) {
            return Err(LibraryError::not_found("Resource"));
        }
        if let Some(course_ids) = &patch.course_ids {
            t.check_courses(course_ids)?;
        }

        let updated = {
            let resource = t
                .resources
                .get_mut(&id)
                .ok_or_else(|| LibraryError::not_found("Resource"))?;
            patch.apply_to(resource);
            resource.clone()
        };

        if let Some(course_ids) = &patch.course_ids {
            t.course_links.retain(|(r, _)| *r != id);
            for course_id in course_ids {
                t.course_links.insert((id, *course_id));
            }
        }
        t.append_audit(audit);
        Ok(t.detail(&updated))
    }

    async fn delete_resource(&self, id: Uuid, audit: &AuditEntry) -> LibraryResult<()> {
        let mut t = self.lock();
        if t.resources.remove(&id).is_none() {
            return Err(LibraryError::not_found("Resource"));
        }
        t.course_links.retain(|(r, _)| *r != id);
        t.download_logs.retain(|l| l.resource_id != id);
        t.append_audit(audit);
        Ok(())
    }

    async fn record_download(&self, log: &DownloadLog) -> LibraryResult<()> {
        let mut t = self.lock();
        let resource = t
            .resources
            .get_mut(&log.resource_id)
            .ok_or_else(|| LibraryError::not_found("Resource"))?;
        resource.download_count += 1;
        t.download_logs.push(log.clone());
        Ok(())
    }

    async fn increment_view_count(&self, id: Uuid) -> LibraryResult<()> {
        let mut t = self.lock();
        let resource = t
            .resources
            .get_mut(&id)
            .ok_or_else(|| LibraryError::not_found("Resource"))?;
        resource.view_count += 1;
        Ok(())
    }

    async fn trending(&self, limit: i64) -> LibraryResult<Vec<TrendingResource>> {
        let t = self.lock();
        let mut rows: Vec<&Resource> = t.resources.values().filter(|r| r.is_active).collect();
        rows.sort_by(|a, b| {
            b.download_count
                .cmp(&a.download_count)
                .then_with(|| b.view_count.cmp(&a.view_count))
        });
        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|r| TrendingResource {
                id: r.id,
                title: r.title.clone(),
                authors: r.authors.clone(),
                category: r.category,
                department: r.department.clone(),
                download_count: r.download_count,
                view_count: r.view_count,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn latest(&self, limit: i64) -> LibraryResult<Vec<LatestResource>> {
        let t = self.lock();
        let mut rows: Vec<&Resource> = t.resources.values().filter(|r| r.is_active).collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|r| LatestResource {
                id: r.id,
                title: r.title.clone(),
                authors: r.authors.clone(),
                category: r.category,
                department: r.department.clone(),
                created_at: r.created_at,
            })
            .collect())
    }

    async fn record_search(
        &self,
        user_id: Option<Uuid>,
        query: &str,
        _result_count: i64,
    ) -> LibraryResult<()> {
        self.lock().search_logs.push(SearchLogRow {
            user_id,
            query: query.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl CourseStore for MemoryStore {
    async fn insert_course(&self, course: &NewCourse) -> LibraryResult<CourseSummary> {
        let mut t = self.lock();
        if t.courses.values().any(|c| c.code == course.code) {
            return Err(LibraryError::Conflict("Record already exists".to_string()));
        }
        let row = CourseSummary {
            id: Uuid::new_v4(),
            code: course.code.clone(),
            title: course.title.clone(),
        };
        t.courses.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_courses(&self) -> LibraryResult<Vec<CourseSummary>> {
        let mut courses: Vec<CourseSummary> = self.lock().courses.values().cloned().collect();
        courses.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(courses)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &NewUser) -> LibraryResult<User> {
        let mut t = self.lock();
        if t.users.values().any(|c| c.user.email == user.email) {
            return Err(LibraryError::Conflict("Record already exists".to_string()));
        }
        let now = Utc::now();
        let row = User {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            email_verified: false,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(
            row.id,
            UserCredentials {
                user: row.clone(),
                password_hash: user.password_hash.clone(),
            },
        );
        Ok(row)
    }

    async fn find_user(&self, id: Uuid) -> LibraryResult<Option<User>> {
        Ok(self.lock().users.get(&id).map(|c| c.user.clone()))
    }

    async fn find_credentials(&self, email: &str) -> LibraryResult<Option<UserCredentials>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|c| c.user.email == email)
            .cloned())
    }

    async fn user_summary(&self, id: Uuid) -> LibraryResult<Option<UserSummary>> {
        let t = self.lock();
        Ok(t.users.get(&id).map(|c| UserSummary {
            user: c.user.clone(),
            counts: t.counts(id, true),
        }))
    }

    async fn list_users(&self, query: &UserQuery) -> LibraryResult<Page<UserSummary>> {
        let t = self.lock();
        let needle = query.search.as_deref().map(str::to_lowercase);
        let mut rows: Vec<&User> = t
            .users
            .values()
            .map(|c| &c.user)
            .filter(|u| query.role.is_none_or(|r| r == u.role))
            .filter(|u| {
                needle.as_ref().is_none_or(|n| {
                    u.name.to_lowercase().contains(n) || u.email.to_lowercase().contains(n)
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            let ord = match query.sort_by {
                UserSortField::CreatedAt => a.created_at.cmp(&b.created_at),
                UserSortField::Name => a.name.cmp(&b.name),
                UserSortField::Email => a.email.cmp(&b.email),
                UserSortField::Role => a.role.as_str().cmp(b.role.as_str()),
            };
            directed(query.sort_order, ord.then_with(|| a.id.cmp(&b.id)))
        });

        let total = rows.len() as i64;
        let data = paginate(rows, query.window.offset(), query.window.limit)
            .into_iter()
            .map(|u| UserSummary {
                user: u.clone(),
                counts: t.counts(u.id, false),
            })
            .collect();
        Ok(Page::offset(data, query.window, total))
    }

    async fn update_user_role(
        &self,
        id: Uuid,
        role: Role,
        audit: &AuditEntry,
    ) -> LibraryResult<User> {
        let mut t = self.lock();
        let creds = t
            .users
            .get_mut(&id)
            .ok_or_else(|| LibraryError::not_found("User"))?;
        creds.user.role = role;
        creds.user.updated_at = Utc::now();
        let user = creds.user.clone();
        t.append_audit(audit);
        Ok(user)
    }

    async fn delete_user(&self, id: Uuid, audit: &AuditEntry) -> LibraryResult<()> {
        let mut t = self.lock();
        let role = t
            .users
            .get(&id)
            .map(|c| c.user.role)
            .ok_or_else(|| LibraryError::not_found("User"))?;
        if role == Role::Admin {
            let admins = t.users.values().filter(|c| c.user.role == Role::Admin).count();
            if admins <= 1 {
                return Err(LibraryError::BadRequest(
                    "Cannot delete the last admin".to_string(),
                ));
            }
        }
        if t.resources.values().any(|r| r.uploaded_by_id == id) {
            return Err(LibraryError::BadRequest(FK_VIOLATION.to_string()));
        }

        t.users.remove(&id);
        t.download_logs.retain(|l| l.user_id != id);
        t.requests.retain(|_, r| r.user_id != id);
        t.refresh_tokens.retain(|_, row| row.record.user_id != id);
        for log in t.search_logs.iter_mut().filter(|l| l.user_id == Some(id)) {
            log.user_id = None;
        }
        t.append_audit(audit);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> LibraryResult<()> {
        self.lock().refresh_tokens.insert(
            record.jti,
            RefreshRow {
                record: record.clone(),
                revoked_at: None,
            },
        );
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old_jti: Uuid,
        next: &RefreshTokenRecord,
    ) -> LibraryResult<bool> {
        let mut t = self.lock();
        let now = Utc::now();
        let Some(old) = t.refresh_tokens.get_mut(&old_jti) else {
            return Ok(false);
        };
        if old.revoked_at.is_some()
            || old.record.expires_at <= now
            || old.record.user_id != next.user_id
        {
            return Ok(false);
        }
        old.revoked_at = Some(now);
        t.refresh_tokens.insert(
            next.jti,
            RefreshRow {
                record: next.clone(),
                revoked_at: None,
            },
        );
        Ok(true)
    }

    async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> LibraryResult<u64> {
        let mut t = self.lock();
        let now = Utc::now();
        let mut revoked = 0;
        for row in t.refresh_tokens.values_mut() {
            if row.record.user_id == user_id && row.revoked_at.is_none() {
                row.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn insert_request(
        &self,
        request: &NewRequest,
        audit: &AuditEntry,
    ) -> LibraryResult<ResourceRequest> {
        let mut t = self.lock();
        if !t.users.contains_key(&request.user_id) {
            return Err(LibraryError::BadRequest(FK_VIOLATION.to_string()));
        }
        let now = Utc::now();
        let row = ResourceRequest {
            id: request.id,
            title: request.title.clone(),
            authors: request.authors.clone(),
            reason: request.reason.clone(),
            category: request.category,
            status: RequestStatus::Open,
            admin_reply: None,
            resolved_at: None,
            user_id: request.user_id,
            created_at: now,
            updated_at: now,
            user: t.user_ref(request.user_id, true),
        };
        t.requests.insert(row.id, row.clone());
        t.append_audit(audit);
        Ok(row)
    }

    async fn find_request(&self, id: Uuid) -> LibraryResult<Option<ResourceRequest>> {
        Ok(self.lock().requests.get(&id).cloned())
    }

    async fn list_requests(&self, query: &RequestQuery) -> LibraryResult<Page<ResourceRequest>> {
        let t = self.lock();
        let mut rows: Vec<&ResourceRequest> =
            t.requests.values().filter(|r| query.matches(r)).collect();
        rows.sort_by(|a, b| {
            let ord = match query.sort_by {
                RequestSortField::CreatedAt => a.created_at.cmp(&b.created_at),
                RequestSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                RequestSortField::Title => a.title.cmp(&b.title),
                RequestSortField::Status => a.status.as_str().cmp(b.status.as_str()),
            };
            directed(query.sort_order, ord.then_with(|| a.id.cmp(&b.id)))
        });
        let total = rows.len() as i64;
        let data = paginate(rows, query.window.offset(), query.window.limit)
            .into_iter()
            .cloned()
            .collect();
        Ok(Page::offset(data, query.window, total))
    }

    async fn update_request(
        &self,
        id: Uuid,
        patch: &RequestPatch,
        audit: &AuditEntry,
    ) -> LibraryResult<ResourceRequest> {
        let mut t = self.lock();
        let request = t
            .requests
            .get_mut(&id)
            .ok_or_else(|| LibraryError::not_found("Request"))?;
        patch.apply_to(request);
        let updated = request.clone();
        t.append_audit(audit);
        Ok(updated)
    }

    async fn delete_request(
        &self,
        id: Uuid,
        require_open: bool,
        audit: &AuditEntry,
    ) -> LibraryResult<()> {
        let mut t = self.lock();
        let status = t
            .requests
            .get(&id)
            .map(|r| r.status)
            .ok_or_else(|| LibraryError::not_found("Request"))?;
        if require_open && status != RequestStatus::Open {
            return Err(LibraryError::Forbidden(
                "Cannot delete a request that is already being processed".to_string(),
            ));
        }
        t.requests.remove(&id);
        t.append_audit(audit);
        Ok(())
    }

    async fn request_stats(&self, recent_since: DateTime<Utc>) -> LibraryResult<RequestStats> {
        let t = self.lock();
        let mut by_status = BTreeMap::new();
        for request in t.requests.values() {
            *by_status.entry(request.status.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(RequestStats {
            total: t.requests.len() as i64,
            recent: t
                .requests
                .values()
                .filter(|r| r.created_at >= recent_since)
                .count() as i64,
            by_status,
        })
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn list_audit_logs(&self, query: &AuditQuery) -> LibraryResult<Page<AuditLog>> {
        let t = self.lock();
        let mut rows: Vec<&AuditLog> = t.audit_logs.iter().filter(|l| query.matches(l)).collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let total = rows.len() as i64;
        let data = paginate(rows, query.window.offset(), query.window.limit)
            .into_iter()
            .map(|log| {
                let mut log = log.clone();
                log.performed_by = t.users.get(&log.performed_by_id).map(|c| AuditPerformer {
                    id: c.user.id,
                    name: c.user.name.clone(),
                    email: c.user.email.clone(),
                    role: c.user.role,
                });
                log
            })
            .collect();
        Ok(Page::offset(data, query.window, total))
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn collect_metrics(&self, recent_since: DateTime<Utc>) -> LibraryResult<Metrics> {
        let t = self.lock();

        let mut by_role = BTreeMap::new();
        for creds in t.users.values() {
            *by_role.entry(creds.user.role.as_str().to_string()).or_insert(0) += 1;
        }

        let mut active: Vec<&Resource> = t.resources.values().filter(|r| r.is_active).collect();
        active.sort_by(|a, b| {
            b.download_count
                .cmp(&a.download_count)
                .then_with(|| b.view_count.cmp(&a.view_count))
        });
        let top_resources = active
            .iter()
            .take(METRICS_TOP_N)
            .map(|r| TopResource {
                id: r.id,
                title: r.title.clone(),
                download_count: r.download_count,
                view_count: r.view_count,
            })
            .collect();

        let mut term_counts: HashMap<&str, i64> = HashMap::new();
        for log in t.search_logs.iter().filter(|l| l.timestamp >= recent_since) {
            *term_counts.entry(log.query.as_str()).or_insert(0) += 1;
        }
        let mut top_terms: Vec<SearchTerm> = term_counts
            .into_iter()
            .map(|(query, count)| SearchTerm {
                query: query.to_string(),
                count,
            })
            .collect();
        top_terms.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.query.cmp(&b.query)));
        top_terms.truncate(METRICS_TOP_N);

        Ok(Metrics {
            users: UserMetrics {
                total: t.users.len() as i64,
                by_role,
            },
            resources: ResourceMetrics {
                total: active.len() as i64,
                top_resources,
            },
            downloads: DownloadMetrics {
                total: t.download_logs.len() as i64,
                recent: t
                    .download_logs
                    .iter()
                    .filter(|l| l.timestamp >= recent_since)
                    .count() as i64,
            },
            searches: SearchMetrics {
                total: t.search_logs.len() as i64,
                recent: t
                    .search_logs
                    .iter()
                    .filter(|l| l.timestamp >= recent_since)
                    .count() as i64,
                top_terms,
            },
            requests: RequestMetrics {
                pending: t.requests.values().filter(|r| r.status.is_pending()).count() as i64,
            },
            generated_at: Utc::now(),
        })
    }
}
