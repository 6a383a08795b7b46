//! Multipart upload extractor for `POST /resources`
//!
//! - `file`: the document (optional, a resource may be metadata only)
//! - `coverImage`: cover image (optional)
//! - every other part is a text metadata field

use axum::{
    body::Body,
    extract::{FromRequest, Multipart, Request},
};
use std::sync::Arc;

use crate::catalog::validation::{check_cover, check_document, parse_metadata_fields};
use crate::catalog::{ResourceMetadata, UploadedFile};
use crate::error::LibraryError;
use crate::gateway::state::AppState;

pub const FILE_FIELD: &str = "file";
pub const COVER_FIELD: &str = "coverImage";

/// Validated upload: handlers never see a disallowed type or oversized part
#[derive(Debug)]
pub struct ResourceUpload {
    pub metadata: ResourceMetadata,
    pub file: Option<UploadedFile>,
    pub cover: Option<UploadedFile>,
}

fn multipart_error(e: impl std::fmt::Display) -> LibraryError {
    LibraryError::BadRequest(format!("Invalid multipart body: {}", e))
}

impl FromRequest<Arc<AppState>, Body> for ResourceUpload {
    type Rejection = LibraryError;

    async fn from_request(req: Request<Body>, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(multipart_error)?;

        let mut file = None;
        let mut cover = None;
        let mut fields = Vec::new();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == FILE_FIELD || name == COVER_FIELD {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                let part = UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                };
                if name == FILE_FIELD {
                    check_document(&part, state.uploads.max_document_bytes)?;
                    file = Some(part);
                } else {
                    check_cover(&part, state.uploads.max_cover_bytes)?;
                    cover = Some(part);
                }
            } else {
                let value = field.text().await.map_err(multipart_error)?;
                fields.push((name, value));
            }
        }

        let metadata = parse_metadata_fields(fields)?;
        Ok(ResourceUpload {
            metadata,
            file,
            cover,
        })
    }
}
