use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::models::{METRICS_RECENT_DAYS, Metrics};
use crate::account::{Role, User, UserQuery, UserSummary};
use crate::audit::{AuditAction, AuditEntity, AuditEntry, AuditLog, AuditQuery};
use crate::cache::{AggregateCache, METRICS_KEY};
use crate::db::LibraryStore;
use crate::error::{LibraryError, LibraryResult};
use crate::pagination::Page;

/// User administration, dashboard metrics and the audit listing
pub struct AdminService {
    store: Arc<dyn LibraryStore>,
    cache: AggregateCache,
}

impl AdminService {
    pub fn new(store: Arc<dyn LibraryStore>, cache: AggregateCache) -> Self {
        Self { store, cache }
    }

    pub async fn get_users(&self, query: &UserQuery) -> LibraryResult<Page<UserSummary>> {
        self.store.list_users(query).await
    }

    pub async fn get_user_by_id(&self, id: Uuid) -> LibraryResult<UserSummary> {
        self.store
            .user_summary(id)
            .await?
            .ok_or_else(|| LibraryError::not_found("User"))
    }

    pub async fn update_user_role(
        &self,
        id: Uuid,
        role: Role,
        admin_id: Uuid,
    ) -> LibraryResult<User> {
        if id == admin_id {
            return Err(LibraryError::BadRequest(
                "Cannot change your own role".to_string(),
            ));
        }
        let current = self
            .store
            .find_user(id)
            .await?
            .ok_or_else(|| LibraryError::not_found("User"))?;

        let audit = AuditEntry::new(
            AuditEntity::User,
            id,
            AuditAction::UpdateRole,
            admin_id,
            json!({ "previousRole": current.role, "newRole": role }),
        );
        let user = self.store.update_user_role(id, role, &audit).await?;

        self.cache.invalidate_metrics().await;
        tracing::info!(
            user_id = %id,
            admin_id = %admin_id,
            previous_role = %current.role,
            new_role = %role,
            "User role updated"
        );
        Ok(user)
    }

    /// The last-admin rule is enforced by the store under row locks
    pub async fn delete_user(&self, id: Uuid, admin_id: Uuid) -> LibraryResult<()> {
        if id == admin_id {
            return Err(LibraryError::BadRequest(
                "Cannot delete your own account".to_string(),
            ));
        }
        let user = self
            .store
            .find_user(id)
            .await?
            .ok_or_else(|| LibraryError::not_found("User"))?;

        let audit = AuditEntry::new(
            AuditEntity::User,
            id,
            AuditAction::Delete,
            admin_id,
            json!({ "email": user.email, "role": user.role }),
        );
        self.store.delete_user(id, &audit).await?;

        self.cache.invalidate_metrics().await;
        tracing::info!(user_id = %id, admin_id = %admin_id, "User deleted");
        Ok(())
    }

    pub async fn get_metrics(&self) -> LibraryResult<Metrics> {
        self.cache
            .get_or_compute(METRICS_KEY, || {
                let since = Utc::now() - Duration::days(METRICS_RECENT_DAYS);
                self.store.collect_metrics(since)
            })
            .await
    }

    pub async fn get_audit_logs(&self, query: &AuditQuery) -> LibraryResult<Page<AuditLog>> {
        self.store.list_audit_logs(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::NewUser;
    use crate::cache::LocalCache;
    use crate::db::{MemoryStore, UserStore};
    use std::time::Duration as StdDuration;

    async fn user(store: &MemoryStore, role: Role, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        store
            .insert_user(&NewUser {
                id,
                email: email.into(),
                name: email.split('@').next().unwrap_or_default().into(),
                password_hash: "x".into(),
                role,
            })
            .await
            .unwrap();
        id
    }

    fn service(store: Arc<MemoryStore>) -> AdminService {
        let cache = AggregateCache::new(Arc::new(LocalCache::new()), StdDuration::from_secs(300));
        AdminService::new(store, cache)
    }

    #[tokio::test]
    async fn test_self_role_change_and_self_delete_are_refused() {
        let store = Arc::new(MemoryStore::new());
        let admin = user(&store, Role::Admin, "root@example.edu").await;
        let admin_svc = service(store.clone());

        let err = admin_svc
            .update_user_role(admin, Role::Student, admin)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot change your own role");

        let err = admin_svc.delete_user(admin, admin).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot delete your own account");
        assert_eq!(store.audit_log_len(), 0);
    }

    #[tokio::test]
    async fn test_last_admin_cannot_be_deleted() {
        let store = Arc::new(MemoryStore::new());
        let first = user(&store, Role::Admin, "first@example.edu").await;
        let second = user(&store, Role::Admin, "second@example.edu").await;
        let admin_svc = service(store.clone());

        admin_svc.delete_user(second, first).await.unwrap();

        // Route guards keep non-admins out; the store rule holds regardless
        let staff = user(&store, Role::Staff, "staff@example.edu").await;
        let err = admin_svc.delete_user(first, staff).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot delete the last admin");
        assert!(store.find_user(first).await.unwrap().is_some());
        assert_eq!(store.audit_log_len(), 1);
    }

    #[tokio::test]
    async fn test_role_change_is_audited_and_refreshes_metrics() {
        let store = Arc::new(MemoryStore::new());
        let admin = user(&store, Role::Admin, "root@example.edu").await;
        let student = user(&store, Role::Student, "kim@example.edu").await;
        let admin_svc = service(store.clone());

        let before = admin_svc.get_metrics().await.unwrap();
        assert_eq!(before.users.by_role.get("STAFF"), None);

        let updated = admin_svc
            .update_user_role(student, Role::Staff, admin)
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Staff);

        let after = admin_svc.get_metrics().await.unwrap();
        assert_eq!(after.users.by_role.get("STAFF"), Some(&1));

        let logs = store.audit_logs_for(student);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, AuditAction::UpdateRole);
        assert_eq!(logs[0].meta["previousRole"], "STUDENT");
        assert_eq!(logs[0].meta["newRole"], "STAFF");
    }

    #[tokio::test]
    async fn test_delete_user_records_email_and_role() {
        let store = Arc::new(MemoryStore::new());
        let admin = user(&store, Role::Admin, "root@example.edu").await;
        let staff = user(&store, Role::Staff, "lee@example.edu").await;
        let admin_svc = service(store.clone());

        admin_svc.delete_user(staff, admin).await.unwrap();
        let err = admin_svc.get_user_by_id(staff).await.unwrap_err();
        assert_eq!(err.to_string(), "User not found");

        let page = admin_svc
            .get_audit_logs(&AuditQuery {
                entity: Some(AuditEntity::User),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].meta["email"], "lee@example.edu");
        assert_eq!(page.data[0].meta["role"], "STAFF");
        let performer = page.data[0].performed_by.as_ref().unwrap();
        assert_eq!(performer.id, admin);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let store = Arc::new(MemoryStore::new());
        let admin = user(&store, Role::Admin, "root@example.edu").await;
        let admin_svc = service(store);

        let err = admin_svc
            .update_user_role(Uuid::new_v4(), Role::Staff, admin)
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::NotFound(_)));
    }
}
