//! Access Authorization & Delivery
//!
//! Stateless decision per call. A granted download commits its log row and
//! counter bump in one store transaction, then asks the blob store for a
//! signed URL outside that transaction. If signing fails the count stays:
//! the access was counted but no URL was handed out.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::models::{AccessContext, AccessType, DeliveryGrant, DownloadLog, Resource};
use crate::db::LibraryStore;
use crate::error::{LibraryError, LibraryResult};
use crate::storage::{BlobResourceType, BlobStore, DownloadUrlOptions};

pub const DOWNLOAD_URL_TTL_SECS: u64 = 3600;
pub const PREVIEW_URL_TTL_SECS: u64 = 1800;

pub struct DeliveryService {
    store: Arc<dyn LibraryStore>,
    blobs: Arc<dyn BlobStore>,
}

impl DeliveryService {
    pub fn new(store: Arc<dyn LibraryStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    async fn load(&self, resource_id: Uuid) -> LibraryResult<Resource> {
        self.store
            .get_resource(resource_id)
            .await?
            .ok_or_else(|| LibraryError::not_found("Resource"))
    }

    pub async fn request_download(
        &self,
        resource_id: Uuid,
        user_id: Uuid,
        context: AccessContext,
    ) -> LibraryResult<DeliveryGrant> {
        let resource = self.load(resource_id).await?;
        let Some(public_id) = resource.cloudinary_id.as_deref() else {
            return Err(LibraryError::BadRequest(
                "This resource does not have a downloadable file".to_string(),
            ));
        };
        if resource.access_type == AccessType::ViewOnly {
            return Err(LibraryError::Forbidden(
                "This resource is view-only and cannot be downloaded".to_string(),
            ));
        }

        let log = DownloadLog {
            id: Uuid::new_v4(),
            user_id,
            resource_id,
            timestamp: Utc::now(),
            ip_address: context.ip_address,
            user_agent: context.user_agent,
        };
        self.store.record_download(&log).await?;

        let url = self
            .blobs
            .generate_download_url(
                public_id,
                DownloadUrlOptions {
                    expires_in_seconds: DOWNLOAD_URL_TTL_SECS,
                    resource_type: BlobResourceType::Raw,
                    filename: Some(resource.title.clone()),
                },
            )
            .await
            .map_err(|e| {
                tracing::warn!(
                    resource_id = %resource_id,
                    user_id = %user_id,
                    "Download counted but no URL issued: {}",
                    e
                );
                LibraryError::from(e)
            })?;

        tracing::info!(resource_id = %resource_id, user_id = %user_id, "Download URL generated");
        Ok(DeliveryGrant {
            url,
            expires_in: DOWNLOAD_URL_TTL_SECS,
        })
    }

    /// VIEW_ONLY resources are previewable; anonymous callers allowed
    pub async fn request_preview(
        &self,
        resource_id: Uuid,
        user_id: Option<Uuid>,
    ) -> LibraryResult<DeliveryGrant> {
        let resource = self.load(resource_id).await?;
        let Some(public_id) = resource.cloudinary_id.as_deref() else {
            return Err(LibraryError::BadRequest(
                "This resource does not have a file".to_string(),
            ));
        };

        self.store.increment_view_count(resource_id).await?;

        let url = self
            .blobs
            .generate_download_url(
                public_id,
                DownloadUrlOptions {
                    expires_in_seconds: PREVIEW_URL_TTL_SECS,
                    resource_type: BlobResourceType::Raw,
                    filename: None,
                },
            )
            .await
            .map_err(|e| {
                tracing::warn!(resource_id = %resource_id, "View counted but no URL issued: {}", e);
                LibraryError::from(e)
            })?;

        tracing::info!(resource_id = %resource_id, user_id = ?user_id, "Preview URL generated");
        Ok(DeliveryGrant {
            url,
            expires_in: PREVIEW_URL_TTL_SECS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{NewUser, Role};
    use crate::audit::{AuditAction, AuditEntity, AuditEntry};
    use crate::catalog::{NewResource, ResourceCategory, StoredBlob};
    use crate::db::{MemoryStore, ResourceStore, UserStore};
    use crate::storage::MemoryBlobStore;
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryStore>,
        blobs: Arc<MemoryBlobStore>,
        delivery: DeliveryService,
        user: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStore::default());
        let user = Uuid::new_v4();
        store
            .insert_user(&NewUser {
                id: user,
                email: "reader@example.edu".into(),
                name: "Reader".into(),
                password_hash: "x".into(),
                role: Role::Student,
            })
            .await
            .unwrap();
        let delivery = DeliveryService::new(store.clone(), blobs.clone());
        Fixture {
            store,
            blobs,
            delivery,
            user,
        }
    }

    async fn seed(f: &Fixture, access_type: AccessType, with_file: bool) -> Uuid {
        let id = Uuid::new_v4();
        let resource = NewResource {
            id,
            title: "Design Patterns".into(),
            description: None,
            authors: vec!["Gamma".into()],
            category: ResourceCategory::Book,
            department: "CS".into(),
            publication_year: Some(1994),
            access_type,
            tags: vec![],
            uploaded_by_id: f.user,
            file: with_file.then(|| StoredBlob {
                public_id: "e-library/resources/1-gof".into(),
                secure_url: "memory://e-library/resources/1-gof".into(),
            }),
            cover: None,
            file_type: None,
            file_size: None,
        };
        let audit = AuditEntry::new(AuditEntity::Resource, id, AuditAction::Create, f.user, json!({}));
        f.store.insert_resource(&resource, &[], &audit).await.unwrap();
        id
    }

    async fn counters(f: &Fixture, id: Uuid) -> (i64, i64) {
        let r = f.store.get_resource(id).await.unwrap().unwrap();
        (r.download_count, r.view_count)
    }

    #[tokio::test]
    async fn test_download_grants_signed_url_and_counts() {
        let f = fixture().await;
        let id = seed(&f, AccessType::Downloadable, true).await;

        let grant = f
            .delivery
            .request_download(id, f.user, AccessContext::default())
            .await
            .unwrap();
        assert_eq!(grant.expires_in, 3600);
        assert!(grant.url.contains("expires_in=3600"));
        assert!(grant.url.contains("filename=Design%20Patterns"));
        assert_eq!(counters(&f, id).await, (1, 0));
        assert_eq!(f.store.download_log_count(id), 1);
    }

    #[tokio::test]
    async fn test_view_only_previews_but_never_downloads() {
        let f = fixture().await;
        let id = seed(&f, AccessType::ViewOnly, true).await;

        let grant = f.delivery.request_preview(id, None).await.unwrap();
        assert_eq!(grant.expires_in, 1800);
        assert_eq!(counters(&f, id).await, (0, 1));

        let err = f
            .delivery
            .request_download(id, f.user, AccessContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::Forbidden(_)));
        assert_eq!(counters(&f, id).await, (0, 1));
        assert_eq!(f.store.download_log_count(id), 0);
    }

    #[tokio::test]
    async fn test_missing_blob_and_missing_resource() {
        let f = fixture().await;
        let id = seed(&f, AccessType::Downloadable, false).await;

        let err = f
            .delivery
            .request_download(id, f.user, AccessContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "This resource does not have a downloadable file");

        let err = f.delivery.request_preview(id, None).await.unwrap_err();
        assert_eq!(err.to_string(), "This resource does not have a file");
        assert_eq!(counters(&f, id).await, (0, 0));

        let err = f
            .delivery
            .request_download(Uuid::new_v4(), f.user, AccessContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_signing_failure_keeps_the_count() {
        let f = fixture().await;
        let id = seed(&f, AccessType::Downloadable, true).await;
        f.blobs.set_fail_sign(true);

        let err = f
            .delivery
            .request_download(id, f.user, AccessContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::Upstream(_)));
        assert_eq!(counters(&f, id).await, (1, 0));
        assert_eq!(f.store.download_log_count(id), 1);
    }

    #[tokio::test]
    async fn test_concurrent_downloads_match_log_rows() {
        let f = Arc::new(fixture().await);
        let id = seed(&f, AccessType::Downloadable, true).await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let f = f.clone();
            handles.push(tokio::spawn(async move {
                f.delivery
                    .request_download(id, f.user, AccessContext::default())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(counters(&f, id).await.0, 20);
        assert_eq!(f.store.download_log_count(id), 20);
    }
}
