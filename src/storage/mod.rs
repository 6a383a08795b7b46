//! Blob Storage
//!
//! Opaque object store for resource files and cover images. The catalog
//! only ever talks to [`BlobStore`]; the provider is picked from config.

pub mod cloudinary;
pub mod memory;

pub use cloudinary::CloudinaryStore;
pub use memory::MemoryBlobStore;

use async_trait::async_trait;
use thiserror::Error;

/// Folder for resource documents
pub const RESOURCE_FOLDER: &str = "e-library/resources";
/// Folder for cover images
pub const COVER_FOLDER: &str = "e-library/resources/covers";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobResourceType {
    Raw,
    Image,
    Auto,
}

impl BlobResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            BlobResourceType::Raw => "raw",
            BlobResourceType::Image => "image",
            BlobResourceType::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub resource_type: BlobResourceType,
    pub public_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub public_id: String,
    pub secure_url: String,
}

#[derive(Debug, Clone)]
pub struct DownloadUrlOptions {
    pub expires_in_seconds: u64,
    pub resource_type: BlobResourceType,
    /// Suggested attachment filename
    pub filename: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlobError {
    #[error("Blob upload failed: {0}")]
    Upload(String),

    #[error("Blob delete failed: {0}")]
    Delete(String),

    #[error("Signed URL generation failed: {0}")]
    Sign(String),

    #[error("Blob store unreachable: {0}")]
    Transport(String),
}

/// Blob store collaborator
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    async fn upload_buffer(
        &self,
        bytes: Vec<u8>,
        folder: &str,
        options: UploadOptions,
    ) -> Result<UploadResult, BlobError>;

    /// Signed, time-limited URL. Expiry is enforced by the provider.
    async fn generate_download_url(
        &self,
        public_id: &str,
        options: DownloadUrlOptions,
    ) -> Result<String, BlobError>;

    /// Best effort; callers log failures
    async fn delete_file(
        &self,
        public_id: &str,
        resource_type: BlobResourceType,
    ) -> Result<(), BlobError>;
}

/// Strip the last extension from an uploaded filename
fn file_stem(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    }
}

/// `<unix-millis>-<stem>`
pub fn document_public_id(filename: &str, now_millis: i64) -> String {
    format!("{}-{}", now_millis, file_stem(filename))
}

/// `<unix-millis>-cover-<stem>`
pub fn cover_public_id(filename: &str, now_millis: i64) -> String {
    format!("{}-cover-{}", now_millis, file_stem(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_ids() {
        assert_eq!(
            document_public_id("lecture.notes.pdf", 1700000000000),
            "1700000000000-lecture.notes"
        );
        assert_eq!(cover_public_id("front.png", 42), "42-cover-front");
        assert_eq!(document_public_id("README", 1), "1-README");
        assert_eq!(document_public_id(".hidden", 1), "1-.hidden");
    }

    #[test]
    fn test_resource_type_strings() {
        assert_eq!(BlobResourceType::Raw.as_str(), "raw");
        assert_eq!(BlobResourceType::Image.as_str(), "image");
        assert_eq!(BlobResourceType::Auto.as_str(), "auto");
    }
}
