//! Resource request lifecycle

use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::models::{
    CreateRequestInput, NewRequest, RequestPatch, RequestQuery, RequestStats, ResourceRequest,
    UpdateRequestInput,
};
use crate::account::Actor;
use crate::audit::{AuditAction, AuditEntity, AuditEntry};
use crate::cache::AggregateCache;
use crate::db::LibraryStore;
use crate::error::{LibraryError, LibraryResult};
use crate::pagination::Page;

/// Window for `RequestStats::recent`
pub const RECENT_REQUEST_DAYS: i64 = 7;

pub struct RequestService {
    store: Arc<dyn LibraryStore>,
    cache: AggregateCache,
}

impl RequestService {
    pub fn new(store: Arc<dyn LibraryStore>, cache: AggregateCache) -> Self {
        Self { store, cache }
    }

    async fn load(&self, id: Uuid) -> LibraryResult<ResourceRequest> {
        self.store
            .find_request(id)
            .await?
            .ok_or_else(|| LibraryError::not_found("Request"))
    }

    pub async fn create(
        &self,
        input: CreateRequestInput,
        user_id: Uuid,
    ) -> LibraryResult<ResourceRequest> {
        input.validate()?;

        let request = NewRequest {
            id: Uuid::new_v4(),
            title: input.title.trim().to_string(),
            authors: input.authors,
            reason: input.reason,
            category: input.category,
            user_id,
        };
        let audit = AuditEntry::new(
            AuditEntity::Request,
            request.id,
            AuditAction::Create,
            user_id,
            json!({ "title": request.title }),
        );
        let created = self.store.insert_request(&request, &audit).await?;

        self.cache.invalidate_metrics().await;
        tracing::info!(request_id = %created.id, user_id = %user_id, "Resource request created");
        Ok(created)
    }

    /// Owners and admins only
    pub async fn find_by_id(&self, id: Uuid, actor: Actor) -> LibraryResult<ResourceRequest> {
        let request = self.load(id).await?;
        if !actor.is_admin() && request.user_id != actor.id {
            return Err(LibraryError::Forbidden("Access denied".to_string()));
        }
        Ok(request)
    }

    /// Non-admins always see only their own requests
    pub async fn find_all(
        &self,
        mut query: RequestQuery,
        actor: Actor,
    ) -> LibraryResult<Page<ResourceRequest>> {
        if !actor.is_admin() {
            query.user_id = Some(actor.id);
        }
        self.store.list_requests(&query).await
    }

    pub async fn update(
        &self,
        id: Uuid,
        input: UpdateRequestInput,
        admin_id: Uuid,
    ) -> LibraryResult<ResourceRequest> {
        input.validate()?;
        let previous = self.load(id).await?;

        let patch = RequestPatch::from_input(&input, Utc::now());
        let audit = AuditEntry::new(
            AuditEntity::Request,
            id,
            AuditAction::Update,
            admin_id,
            json!({ "changes": input, "previousStatus": previous.status }),
        );
        let updated = self.store.update_request(id, &patch, &audit).await?;

        self.cache.invalidate_metrics().await;
        if input.status.is_some_and(|s| s != previous.status) {
            notify_status_change(&updated);
        }
        tracing::info!(
            request_id = %id,
            admin_id = %admin_id,
            new_status = ?input.status,
            "Request updated"
        );
        Ok(updated)
    }

    /// Owner while OPEN, or an admin at any time
    pub async fn delete(&self, id: Uuid, actor: Actor) -> LibraryResult<()> {
        let request = self.load(id).await?;
        let is_admin = actor.is_admin();
        if !is_admin && request.user_id != actor.id {
            return Err(LibraryError::Forbidden("Access denied".to_string()));
        }

        let audit = AuditEntry::new(
            AuditEntity::Request,
            id,
            AuditAction::Delete,
            actor.id,
            json!({ "title": request.title }),
        );
        // The status check repeats under the row lock in the store
        self.store.delete_request(id, !is_admin, &audit).await?;

        self.cache.invalidate_metrics().await;
        tracing::info!(request_id = %id, user_id = %actor.id, "Request deleted");
        Ok(())
    }

    pub async fn stats(&self) -> LibraryResult<RequestStats> {
        let since = Utc::now() - Duration::days(RECENT_REQUEST_DAYS);
        self.store.request_stats(since).await
    }
}

/// E-mail delivery lives outside this service; the event is only logged
fn notify_status_change(request: &ResourceRequest) {
    tracing::info!(
        request_id = %request.id,
        recipient = ?request.user.email,
        status = %request.status,
        "Request status notification queued"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::RequestStatus;
    use crate::account::{NewUser, Role};
    use crate::catalog::ResourceCategory;
    use crate::db::{MemoryStore, UserStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        service: RequestService,
        admin: Actor,
        student: Actor,
    }

    async fn user(store: &MemoryStore, role: Role) -> Actor {
        let id = Uuid::new_v4();
        store
            .insert_user(&NewUser {
                id,
                email: format!("{}@example.edu", id.simple()),
                name: "Someone".into(),
                password_hash: "x".into(),
                role,
            })
            .await
            .unwrap();
        Actor::new(id, role)
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let admin = user(&store, Role::Admin).await;
        let student = user(&store, Role::Student).await;
        let service = RequestService::new(store.clone(), AggregateCache::disabled());
        Fixture {
            store,
            service,
            admin,
            student,
        }
    }

    fn input(title: &str) -> CreateRequestInput {
        CreateRequestInput {
            title: title.into(),
            authors: Some("Hennessy, Patterson".into()),
            reason: "Needed for the architecture course".into(),
            category: Some(ResourceCategory::Book),
        }
    }

    #[tokio::test]
    async fn test_resolved_at_tracks_status() {
        let f = fixture().await;
        let created = f
            .service
            .create(input("Computer Architecture"), f.student.id)
            .await
            .unwrap();
        assert_eq!(created.status, RequestStatus::Open);
        assert!(created.resolved_at.is_none());

        let resolved = f
            .service
            .update(
                created.id,
                UpdateRequestInput {
                    status: Some(RequestStatus::Resolved),
                    admin_reply: Some("Added to the catalog".into()),
                },
                f.admin.id,
            )
            .await
            .unwrap();
        assert!(resolved.resolved_at.is_some());

        let reopened = f
            .service
            .update(
                created.id,
                UpdateRequestInput {
                    status: Some(RequestStatus::InProgress),
                    admin_reply: None,
                },
                f.admin.id,
            )
            .await
            .unwrap();
        assert!(reopened.resolved_at.is_none());
        assert_eq!(reopened.admin_reply.as_deref(), Some("Added to the catalog"));

        let logs = f.store.audit_logs_for(created.id);
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[1].meta["previousStatus"], "OPEN");
        assert_eq!(logs[2].meta["changes"]["status"], "IN_PROGRESS");
    }

    #[tokio::test]
    async fn test_only_owner_or_admin_reads() {
        let f = fixture().await;
        let created = f.service.create(input("SICP"), f.student.id).await.unwrap();

        let other = user(&f.store, Role::Student).await;
        let err = f.service.find_by_id(created.id, other).await.unwrap_err();
        assert_eq!(err.to_string(), "Access denied");

        assert!(f.service.find_by_id(created.id, f.student).await.is_ok());
        assert!(f.service.find_by_id(created.id, f.admin).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_admin_listing_is_scoped() {
        let f = fixture().await;
        f.service.create(input("Mine"), f.student.id).await.unwrap();
        f.service.create(input("Theirs"), f.admin.id).await.unwrap();

        let query = RequestQuery {
            user_id: Some(f.admin.id),
            ..Default::default()
        };
        let page = f.service.find_all(query.clone(), f.student).await.unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].title, "Mine");

        let page = f.service.find_all(RequestQuery::default(), f.admin).await.unwrap();
        assert_eq!(page.data.len(), 2);
    }

    #[tokio::test]
    async fn test_owner_delete_only_while_open() {
        let f = fixture().await;
        let created = f.service.create(input("Dragon Book"), f.student.id).await.unwrap();
        f.service
            .update(
                created.id,
                UpdateRequestInput {
                    status: Some(RequestStatus::InProgress),
                    admin_reply: None,
                },
                f.admin.id,
            )
            .await
            .unwrap();

        let err = f.service.delete(created.id, f.student).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot delete a request that is already being processed"
        );

        f.service.delete(created.id, f.admin).await.unwrap();
        let err = f.service.find_by_id(created.id, f.admin).await.unwrap_err();
        assert_eq!(err.to_string(), "Request not found");
    }

    #[tokio::test]
    async fn test_stats() {
        let f = fixture().await;
        f.service.create(input("One"), f.student.id).await.unwrap();
        let two = f.service.create(input("Two"), f.student.id).await.unwrap();
        f.service
            .update(
                two.id,
                UpdateRequestInput {
                    status: Some(RequestStatus::Rejected),
                    admin_reply: None,
                },
                f.admin.id,
            )
            .await
            .unwrap();

        let stats = f.service.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.recent, 2);
        assert_eq!(stats.by_status.get("OPEN"), Some(&1));
        assert_eq!(stats.by_status.get("REJECTED"), Some(&1));
    }
}
