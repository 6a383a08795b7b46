//! Cross-module flows on the in-memory store and blob store

use std::sync::Arc;
use std::time::Duration;

use e_library::account::{Actor, NewUser, Role};
use e_library::admin::AdminService;
use e_library::audit::{AuditAction, AuditEntity};
use e_library::cache::{AggregateCache, LocalCache};
use e_library::catalog::{
    AccessContext, AccessType, DeliveryService, ResourceCategory, ResourceMetadata,
    ResourcePatch, ResourceRepository, UploadedFile,
};
use e_library::db::{MemoryStore, ResourceStore, UserStore};
use e_library::error::LibraryError;
use e_library::requests::{CreateRequestInput, RequestService, RequestStatus, UpdateRequestInput};
use e_library::storage::MemoryBlobStore;
use uuid::Uuid;

struct Library {
    store: Arc<MemoryStore>,
    blobs: Arc<MemoryBlobStore>,
    resources: ResourceRepository,
    delivery: Arc<DeliveryService>,
    requests: RequestService,
    admin: AdminService,
}

impl Library {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let cache = AggregateCache::new(Arc::new(LocalCache::new()), Duration::from_secs(300));
        Self {
            resources: ResourceRepository::new(store.clone(), blobs.clone(), cache.clone()),
            delivery: Arc::new(DeliveryService::new(store.clone(), blobs.clone())),
            requests: RequestService::new(store.clone(), cache.clone()),
            admin: AdminService::new(store.clone(), cache),
            store,
            blobs,
        }
    }

    async fn user(&self, name: &str, role: Role) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert_user(&NewUser {
                id,
                email: format!("{}@uni.edu", name.to_lowercase()),
                name: name.to_string(),
                password_hash: "unused".to_string(),
                role,
            })
            .await
            .unwrap();
        id
    }

    async fn upload(&self, title: &str, access_type: AccessType, with_file: bool, staff: Uuid) -> Uuid {
        let metadata = ResourceMetadata {
            title: title.to_string(),
            description: None,
            category: ResourceCategory::Paper,
            department: "Physics".to_string(),
            authors: vec!["Noether".to_string()],
            publication_year: Some(1918),
            access_type,
            tags: vec!["symmetry".to_string()],
            course_ids: vec![],
        };
        let file = with_file.then(|| UploadedFile {
            file_name: "invariants.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            bytes: b"%PDF-1.4 invariant variation problems".to_vec(),
        });
        self.resources
            .create(metadata, file, None, staff)
            .await
            .unwrap()
            .resource
            .id
    }
}

fn context() -> AccessContext {
    AccessContext {
        ip_address: Some("198.51.100.4".to_string()),
        user_agent: Some("integration-test".to_string()),
    }
}

#[tokio::test]
async fn qa_concurrent_downloads_keep_count_and_logs_equal() {
    let lib = Library::new();
    let staff = lib.user("Staff", Role::Staff).await;
    let student = lib.user("Student", Role::Student).await;
    let id = lib.upload("Invariant Variation Problems", AccessType::Downloadable, true, staff).await;

    let tasks = (0..16).map(|_| {
        let delivery = lib.delivery.clone();
        tokio::spawn(async move { delivery.request_download(id, student, context()).await })
    });
    for grant in futures::future::join_all(tasks).await {
        let grant = grant.unwrap().unwrap();
        assert_eq!(grant.expires_in, 3600);
    }

    let resource = lib.store.get_resource(id).await.unwrap().unwrap();
    assert_eq!(resource.download_count, 16);
    assert_eq!(lib.store.download_log_count(id), 16);
}

#[tokio::test]
async fn qa_view_only_previews_but_never_downloads() {
    let lib = Library::new();
    let staff = lib.user("Staff", Role::Staff).await;
    let student = lib.user("Student", Role::Student).await;
    let id = lib.upload("Lecture Slides", AccessType::ViewOnly, true, staff).await;

    let preview = lib.delivery.request_preview(id, None).await.unwrap();
    assert_eq!(preview.expires_in, 1800);

    let err = lib
        .delivery
        .request_download(id, student, context())
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::Forbidden(_)));

    let resource = lib.store.get_resource(id).await.unwrap().unwrap();
    assert_eq!(resource.view_count, 1);
    assert_eq!(resource.download_count, 0);
    assert_eq!(lib.store.download_log_count(id), 0);
}

#[tokio::test]
async fn qa_resource_without_file_is_not_deliverable() {
    let lib = Library::new();
    let staff = lib.user("Staff", Role::Staff).await;
    let id = lib.upload("Catalog Card Only", AccessType::Downloadable, false, staff).await;

    let err = lib
        .delivery
        .request_download(id, staff, context())
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::BadRequest(_)));
    assert!(matches!(
        lib.delivery.request_preview(id, Some(staff)).await,
        Err(LibraryError::BadRequest(_))
    ));

    let resource = lib.store.get_resource(id).await.unwrap().unwrap();
    assert_eq!(resource.download_count, 0);
    assert_eq!(resource.view_count, 0);
}

#[tokio::test]
async fn qa_unsigned_download_stays_counted() {
    let lib = Library::new();
    let staff = lib.user("Staff", Role::Staff).await;
    let id = lib.upload("Counted Anyway", AccessType::Downloadable, true, staff).await;

    lib.blobs.set_fail_sign(true);
    let err = lib
        .delivery
        .request_download(id, staff, context())
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::Upstream(_)));

    // Known over-count: the log row and counter are not rolled back
    let resource = lib.store.get_resource(id).await.unwrap().unwrap();
    assert_eq!(resource.download_count, 1);
    assert_eq!(lib.store.download_log_count(id), 1);
}

#[tokio::test]
async fn qa_cached_views_follow_mutations() {
    let lib = Library::new();
    let staff = lib.user("Staff", Role::Staff).await;
    let admin = lib.user("Admin", Role::Admin).await;

    let first = lib.upload("First Edition", AccessType::Downloadable, true, staff).await;
    assert_eq!(lib.resources.get_latest(10).await.unwrap().len(), 1);

    // Create is visible immediately despite the warm cache
    let second = lib.upload("Second Edition", AccessType::Downloadable, true, staff).await;
    let latest = lib.resources.get_latest(10).await.unwrap();
    assert_eq!(latest.len(), 2);

    // Update
    let trending = lib.resources.get_trending(10).await.unwrap();
    assert!(trending.iter().any(|r| r.title == "First Edition"));
    let patch = ResourcePatch {
        title: Some("First Edition, Revised".to_string()),
        ..Default::default()
    };
    lib.resources
        .update(first, patch, Actor::new(staff, Role::Staff))
        .await
        .unwrap();
    let trending = lib.resources.get_trending(10).await.unwrap();
    assert!(trending.iter().any(|r| r.title == "First Edition, Revised"));

    // Delete
    lib.resources.delete(second, admin).await.unwrap();
    let latest = lib.resources.get_latest(10).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id, first);
}

#[tokio::test]
async fn qa_every_mutation_leaves_one_audit_row() {
    let lib = Library::new();
    let admin = lib.user("Admin", Role::Admin).await;
    let staff = lib.user("Staff", Role::Staff).await;
    let student = lib.user("Student", Role::Student).await;

    // Role change
    lib.admin
        .update_user_role(student, Role::Staff, admin)
        .await
        .unwrap();
    let rows = lib.store.audit_logs_for(student);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].action, AuditAction::UpdateRole);
    assert_eq!(rows[0].entity, AuditEntity::User);

    // Resource create + update
    let resource = lib.upload("Audited Paper", AccessType::Downloadable, true, staff).await;
    let patch = ResourcePatch {
        tags: Some(vec!["audited".to_string()]),
        ..Default::default()
    };
    lib.resources
        .update(resource, patch, Actor::new(admin, Role::Admin))
        .await
        .unwrap();
    let actions: Vec<_> = lib
        .store
        .audit_logs_for(resource)
        .iter()
        .map(|r| r.action)
        .collect();
    assert_eq!(actions.len(), 2);
    assert!(actions.contains(&AuditAction::Create));
    assert!(actions.contains(&AuditAction::Update));

    // Request status change
    let request = lib
        .requests
        .create(
            CreateRequestInput {
                title: "Feynman Lectures".to_string(),
                authors: None,
                reason: "Needed for the quantum mechanics module".to_string(),
                category: Some(ResourceCategory::Book),
            },
            staff,
        )
        .await
        .unwrap();
    let updated = lib
        .requests
        .update(
            request.id,
            UpdateRequestInput {
                status: Some(RequestStatus::Resolved),
                admin_reply: Some("Added to the catalog".to_string()),
            },
            admin,
        )
        .await
        .unwrap();
    assert!(updated.resolved_at.is_some());
    let rows = lib.store.audit_logs_for(request.id);
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows.iter().filter(|r| r.action == AuditAction::Update).count(),
        1
    );
}

#[tokio::test]
async fn qa_failed_mutation_leaves_no_audit_row() {
    let lib = Library::new();
    let admin = lib.user("Admin", Role::Admin).await;
    let before = lib.store.audit_log_len();

    let err = lib
        .admin
        .update_user_role(admin, Role::Student, admin)
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::BadRequest(ref m) if m == "Cannot change your own role"));

    let err = lib.admin.delete_user(admin, admin).await.unwrap_err();
    assert!(matches!(err, LibraryError::BadRequest(ref m) if m == "Cannot delete your own account"));

    assert_eq!(lib.store.audit_log_len(), before);
}

#[tokio::test]
async fn qa_last_admin_cannot_be_deleted() {
    let lib = Library::new();
    let admin = lib.user("Admin", Role::Admin).await;
    // A staff member promoted to admin, then demoting the original leaves one admin
    let deputy = lib.user("Deputy", Role::Staff).await;
    lib.admin.update_user_role(deputy, Role::Admin, admin).await.unwrap();
    lib.admin.update_user_role(admin, Role::Staff, deputy).await.unwrap();

    let err = lib.admin.delete_user(deputy, admin).await.unwrap_err();
    assert!(matches!(err, LibraryError::BadRequest(ref m) if m == "Cannot delete the last admin"));
    assert!(lib.admin.get_user_by_id(deputy).await.is_ok());
}
