//! Resource Repository
//!
//! CRUD and listing over resource records. Blobs are pushed to the store
//! before the row is inserted, so a row never points at a missing blob.
//! Every mutation writes its audit row in the store transaction and drops
//! the cached resource views before returning.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::models::{
    CourseSummary, LatestResource, NewCourse, NewResource, ResourceDetail, ResourceListItem,
    ResourcePatch, ResourceQuery, StoredBlob, TrendingResource,
};
use super::validation::{ResourceMetadata, UploadedFile, check_patch};
use crate::account::Actor;
use crate::audit::{AuditAction, AuditEntity, AuditEntry};
use crate::cache::{self, AggregateCache};
use crate::db::LibraryStore;
use crate::error::{LibraryError, LibraryResult};
use crate::pagination::{Page, Pagination};
use crate::storage::{
    BlobResourceType, BlobStore, COVER_FOLDER, RESOURCE_FOLDER, UploadOptions, cover_public_id,
    document_public_id,
};

pub const DEFAULT_SHOWCASE_LIMIT: i64 = 10;

pub struct ResourceRepository {
    store: Arc<dyn LibraryStore>,
    blobs: Arc<dyn BlobStore>,
    cache: AggregateCache,
}

impl ResourceRepository {
    pub fn new(store: Arc<dyn LibraryStore>, blobs: Arc<dyn BlobStore>, cache: AggregateCache) -> Self {
        Self { store, blobs, cache }
    }

    async fn upload(
        &self,
        file: UploadedFile,
        folder: &str,
        public_id: String,
        resource_type: BlobResourceType,
    ) -> LibraryResult<StoredBlob> {
        let result = self
            .blobs
            .upload_buffer(
                file.bytes,
                folder,
                UploadOptions {
                    resource_type,
                    public_id,
                },
            )
            .await?;
        Ok(StoredBlob {
            public_id: result.public_id,
            secure_url: result.secure_url,
        })
    }

    /// Remove blobs whose row was never written
    async fn discard_uploaded(&self, blobs: &[(&StoredBlob, BlobResourceType)]) {
        for (blob, resource_type) in blobs {
            if let Err(e) = self.blobs.delete_file(&blob.public_id, *resource_type).await {
                tracing::warn!(public_id = %blob.public_id, "Orphaned blob left in {}: {}", self.blobs.name(), e);
            }
        }
    }

    pub async fn create(
        &self,
        metadata: ResourceMetadata,
        file: Option<UploadedFile>,
        cover: Option<UploadedFile>,
        uploader_id: Uuid,
    ) -> LibraryResult<ResourceDetail> {
        metadata.check()?;

        let now_millis = Utc::now().timestamp_millis();
        let file_type = file.as_ref().map(|f| f.content_type.clone());
        let file_size = file.as_ref().map(|f| f.size() as i64);

        let stored_file = match file {
            Some(f) => {
                let public_id = document_public_id(&f.file_name, now_millis);
                Some(self.upload(f, RESOURCE_FOLDER, public_id, BlobResourceType::Auto).await?)
            }
            None => None,
        };

        let stored_cover = match cover {
            Some(c) => {
                let public_id = cover_public_id(&c.file_name, now_millis);
                match self.upload(c, COVER_FOLDER, public_id, BlobResourceType::Image).await {
                    Ok(blob) => Some(blob),
                    Err(e) => {
                        if let Some(blob) = &stored_file {
                            self.discard_uploaded(&[(blob, BlobResourceType::Raw)]).await;
                        }
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        let new_resource = NewResource {
            id: Uuid::new_v4(),
            title: metadata.title,
            description: metadata.description,
            authors: metadata.authors,
            category: metadata.category,
            department: metadata.department,
            publication_year: metadata.publication_year,
            access_type: metadata.access_type,
            tags: metadata.tags,
            uploaded_by_id: uploader_id,
            file: stored_file,
            cover: stored_cover,
            file_type,
            file_size,
        };
        let audit = AuditEntry::new(
            AuditEntity::Resource,
            new_resource.id,
            AuditAction::Create,
            uploader_id,
            json!({ "title": new_resource.title }),
        );

        let detail = match self
            .store
            .insert_resource(&new_resource, &metadata.course_ids, &audit)
            .await
        {
            Ok(detail) => detail,
            Err(e) => {
                let mut uploaded = Vec::new();
                if let Some(blob) = &new_resource.file {
                    uploaded.push((blob, BlobResourceType::Raw));
                }
                if let Some(blob) = &new_resource.cover {
                    uploaded.push((blob, BlobResourceType::Image));
                }
                self.discard_uploaded(&uploaded).await;
                return Err(e);
            }
        };

        self.cache.invalidate_resource_views().await;
        tracing::info!(resource_id = %detail.resource.id, title = %detail.resource.title, "Resource created");
        Ok(detail)
    }

    /// Regardless of `isActive`
    pub async fn find_by_id(&self, id: Uuid) -> LibraryResult<ResourceDetail> {
        self.store
            .find_resource(id)
            .await?
            .ok_or_else(|| LibraryError::not_found("Resource"))
    }

    /// Listings with a search term are cached under `search:` and logged
    pub async fn find_all(
        &self,
        query: &ResourceQuery,
        searcher: Option<Uuid>,
    ) -> LibraryResult<Page<ResourceListItem>> {
        let Some(term) = query.search_term() else {
            return self.store.list_resources(query).await;
        };

        let key = cache::search_key(query)?;
        let page = self
            .cache
            .get_or_compute(&key, || self.store.list_resources(query))
            .await?;

        let result_count = match &page.pagination {
            Pagination::Offset(p) => p.total,
            Pagination::Cursor(_) => page.data.len() as i64,
        };
        if let Err(e) = self.store.record_search(searcher, term, result_count).await {
            tracing::warn!("Search log write failed: {}", e);
        }
        Ok(page)
    }

    /// Staff and admins may update anything, uploaders their own resources
    pub async fn update(
        &self,
        id: Uuid,
        patch: ResourcePatch,
        actor: Actor,
    ) -> LibraryResult<ResourceDetail> {
        check_patch(&patch)?;

        let resource = self
            .store
            .get_resource(id)
            .await?
            .ok_or_else(|| LibraryError::not_found("Resource"))?;
        if !actor.role.can_curate() && resource.uploaded_by_id != actor.id {
            return Err(LibraryError::Forbidden(
                "You do not have permission to update this resource".to_string(),
            ));
        }

        let audit = AuditEntry::new(
            AuditEntity::Resource,
            id,
            AuditAction::Update,
            actor.id,
            json!({ "changes": patch }),
        );
        let detail = self.store.update_resource(id, &patch, &audit).await?;

        self.cache.invalidate_resource_views().await;
        tracing::info!(resource_id = %id, "Resource updated");
        Ok(detail)
    }

    /// Blob deletion is best effort; the row goes regardless
    pub async fn delete(&self, id: Uuid, actor_id: Uuid) -> LibraryResult<()> {
        let resource = self
            .store
            .get_resource(id)
            .await?
            .ok_or_else(|| LibraryError::not_found("Resource"))?;

        if let Some(public_id) = &resource.cloudinary_id
            && let Err(e) = self.blobs.delete_file(public_id, BlobResourceType::Raw).await
        {
            tracing::error!(resource_id = %id, "Failed to delete file from {}: {}", self.blobs.name(), e);
        }
        if let Some(public_id) = &resource.cover_image_id
            && let Err(e) = self.blobs.delete_file(public_id, BlobResourceType::Image).await
        {
            tracing::error!(resource_id = %id, "Failed to delete cover image from {}: {}", self.blobs.name(), e);
        }

        let audit = AuditEntry::new(
            AuditEntity::Resource,
            id,
            AuditAction::Delete,
            actor_id,
            json!({ "title": resource.title }),
        );
        self.store.delete_resource(id, &audit).await?;

        self.cache.invalidate_resource_views().await;
        tracing::info!(resource_id = %id, "Resource deleted");
        Ok(())
    }

    pub async fn get_trending(&self, limit: i64) -> LibraryResult<Vec<TrendingResource>> {
        self.cache
            .get_or_compute(&cache::trending_key(limit), || self.store.trending(limit))
            .await
    }

    pub async fn get_latest(&self, limit: i64) -> LibraryResult<Vec<LatestResource>> {
        self.cache
            .get_or_compute(&cache::latest_key(limit), || self.store.latest(limit))
            .await
    }

    pub async fn list_courses(&self) -> LibraryResult<Vec<CourseSummary>> {
        self.store.list_courses().await
    }

    pub async fn create_course(&self, course: NewCourse) -> LibraryResult<CourseSummary> {
        course.validate()?;
        let created = self.store.insert_course(&course).await?;
        tracing::info!(course_id = %created.id, code = %created.code, "Course created");
        Ok(created)
    }
}
