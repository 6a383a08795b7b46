//! In-memory blob store
//!
//! Used when no provider is configured and by the service tests. Each
//! operation can be switched to fail so error paths can be exercised.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{BlobError, BlobResourceType, BlobStore, DownloadUrlOptions, UploadOptions, UploadResult};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub folder: String,
    pub resource_type: BlobResourceType,
    pub size: usize,
}

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    upload_count: AtomicUsize,
    delete_count: AtomicUsize,
    sign_count: AtomicUsize,
    fail_upload: AtomicBool,
    fail_delete: AtomicBool,
    fail_sign: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_upload(&self, fail: bool) {
        self.fail_upload.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_sign(&self, fail: bool) {
        self.fail_sign.store(fail, Ordering::SeqCst);
    }

    pub fn upload_count(&self) -> usize {
        self.upload_count.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.delete_count.load(Ordering::SeqCst)
    }

    pub fn sign_count(&self) -> usize {
        self.sign_count.load(Ordering::SeqCst)
    }

    pub fn contains(&self, public_id: &str) -> bool {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(public_id)
    }

    pub fn object(&self, public_id: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(public_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upload_buffer(
        &self,
        bytes: Vec<u8>,
        folder: &str,
        options: UploadOptions,
    ) -> Result<UploadResult, BlobError> {
        self.upload_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(BlobError::Upload("simulated upload failure".to_string()));
        }

        let public_id = format!("{}/{}", folder, options.public_id);
        let secure_url = format!("memory://{}", public_id);
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).insert(
            public_id.clone(),
            StoredObject {
                folder: folder.to_string(),
                resource_type: options.resource_type,
                size: bytes.len(),
            },
        );
        Ok(UploadResult {
            public_id,
            secure_url,
        })
    }

    async fn generate_download_url(
        &self,
        public_id: &str,
        options: DownloadUrlOptions,
    ) -> Result<String, BlobError> {
        self.sign_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign.load(Ordering::SeqCst) {
            return Err(BlobError::Sign("simulated signing failure".to_string()));
        }

        let mut url = format!(
            "memory://{}?type={}&expires_in={}",
            public_id,
            options.resource_type.as_str(),
            options.expires_in_seconds
        );
        if let Some(filename) = options.filename {
            url.push_str("&filename=");
            url.push_str(&urlencoding::encode(&filename));
        }
        Ok(url)
    }

    async fn delete_file(
        &self,
        public_id: &str,
        _resource_type: BlobResourceType,
    ) -> Result<(), BlobError> {
        self.delete_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(BlobError::Delete("simulated delete failure".to_string()));
        }
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(public_id);
        Ok(())
    }
}
