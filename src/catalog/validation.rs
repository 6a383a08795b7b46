//! Upload policy and resource metadata validation
//!
//! Multipart text fields arrive as strings. Values that look like JSON
//! (`[...]` or `{...}`) are decoded first, `publicationYear` is coerced to a
//! number, and the result is deserialized into [`ResourceMetadata`] and
//! validated. Only the first field error is reported.

use chrono::{Datelike, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::Validate;

use super::models::{AccessType, ResourceCategory, ResourcePatch};
use crate::error::{LibraryError, LibraryResult};

pub const MIN_PUBLICATION_YEAR: i32 = 1800;

pub const DOCUMENT_MIME_TYPES: [&str; 6] = [
    "application/pdf",
    "application/epub+zip",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
];

pub const COVER_MIME_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/svg+xml",
];

/// One file part of a multipart upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

fn megabytes(bytes: usize) -> usize {
    bytes / (1024 * 1024)
}

pub fn check_document(file: &UploadedFile, max_bytes: usize) -> LibraryResult<()> {
    if !DOCUMENT_MIME_TYPES.contains(&file.content_type.as_str()) {
        return Err(LibraryError::validation(
            "file",
            "Invalid file type. Only PDF, EPUB, DOC, DOCX, PPT, and PPTX files are allowed.",
        ));
    }
    if file.size() > max_bytes {
        return Err(LibraryError::validation(
            "file",
            format!("File size must be less than {}MB", megabytes(max_bytes)),
        ));
    }
    Ok(())
}

pub fn check_cover(file: &UploadedFile, max_bytes: usize) -> LibraryResult<()> {
    if !COVER_MIME_TYPES.contains(&file.content_type.as_str()) {
        return Err(LibraryError::validation(
            "coverImage",
            "Invalid cover image type. Only common image formats (JPEG, PNG, WebP, GIF, SVG) are allowed.",
        ));
    }
    if file.size() > max_bytes {
        return Err(LibraryError::validation(
            "coverImage",
            format!("Cover image must be less than {}MB", megabytes(max_bytes)),
        ));
    }
    Ok(())
}

/// `1800..=current year + 1`
pub fn check_publication_year(year: Option<i32>) -> LibraryResult<()> {
    let Some(year) = year else {
        return Ok(());
    };
    let max = Utc::now().year() + 1;
    if !(MIN_PUBLICATION_YEAR..=max).contains(&year) {
        return Err(LibraryError::validation(
            "publicationYear",
            format!(
                "Publication year must be between {} and {}",
                MIN_PUBLICATION_YEAR, max
            ),
        ));
    }
    Ok(())
}

/// Metadata fields of `POST /resources`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    #[validate(length(min = 3, max = 200, message = "Title must be between 3 and 200 characters"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 2000, message = "Description must be less than 2000 characters"))]
    pub description: Option<String>,
    pub category: ResourceCategory,
    #[validate(length(min = 1, max = 200, message = "Department is required"))]
    pub department: String,
    #[validate(length(min = 1, message = "At least one author is required"))]
    pub authors: Vec<String>,
    #[serde(default)]
    pub publication_year: Option<i32>,
    #[serde(default)]
    pub access_type: AccessType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub course_ids: Vec<Uuid>,
}

impl ResourceMetadata {
    pub fn check(&self) -> LibraryResult<()> {
        self.validate()?;
        check_publication_year(self.publication_year)
    }
}

pub fn check_patch(patch: &ResourcePatch) -> LibraryResult<()> {
    patch.validate()?;
    check_publication_year(patch.publication_year)
}

/// Decode one multipart text value
fn coerce_field(name: &str, raw: &str) -> LibraryResult<Value> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Ok(value);
        }
    }
    if name == "publicationYear" {
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        let year: i64 = trimmed.parse().map_err(|_| {
            LibraryError::validation("publicationYear", "Publication year must be a number")
        })?;
        return Ok(Value::from(year));
    }
    Ok(Value::String(raw.to_string()))
}

/// Build and validate metadata from multipart text fields
pub fn parse_metadata_fields(fields: Vec<(String, String)>) -> LibraryResult<ResourceMetadata> {
    let mut map = Map::new();
    for (name, raw) in fields {
        let value = coerce_field(&name, &raw)?;
        map.insert(name, value);
    }

    // A lone author or tag arrives as a plain string
    for list_field in ["authors", "tags"] {
        if let Some(Value::String(single)) = map.get(list_field).cloned() {
            map.insert(list_field.to_string(), Value::Array(vec![Value::String(single)]));
        }
    }

    check_shape(&map)?;
    let metadata: ResourceMetadata = serde_json::from_value(Value::Object(map)).map_err(|e| {
        tracing::debug!("Undecodable resource fields: {}", e);
        LibraryError::validation("fields", "Invalid resource fields")
    })?;
    metadata.check()?;
    Ok(metadata)
}

fn is_string_list(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|items| items.iter().all(Value::is_string))
}

/// Presence and enum checks that decoding alone would report as a bare
/// decoder message. The alphabetically first failing field wins.
fn check_shape(map: &Map<String, Value>) -> LibraryResult<()> {
    let text = |name: &str| map.get(name).and_then(Value::as_str).map(str::trim);
    let mut errors: Vec<(&str, String)> = Vec::new();

    match text("accessType") {
        Some(raw) if raw.parse::<AccessType>().is_err() => errors.push((
            "accessType",
            "Access type must be VIEW_ONLY or DOWNLOADABLE".to_string(),
        )),
        None if map.get("accessType").is_some_and(|v| !v.is_null()) => errors.push((
            "accessType",
            "Access type must be VIEW_ONLY or DOWNLOADABLE".to_string(),
        )),
        _ => {}
    }
    if !map.get("authors").is_some_and(is_string_list) {
        errors.push(("authors", "At least one author is required".to_string()));
    }
    match text("category") {
        None | Some("") => errors.push(("category", "Category is required".to_string())),
        Some(raw) if raw.parse::<ResourceCategory>().is_err() => errors.push((
            "category",
            "Category must be one of BOOK, JOURNAL, PAPER, MAGAZINE, THESIS, OTHER".to_string(),
        )),
        _ => {}
    }
    let bad_course_ids = map.get("courseIds").is_some_and(|v| {
        !v.as_array().is_some_and(|ids| {
            ids.iter()
                .all(|id| id.as_str().is_some_and(|s| Uuid::parse_str(s).is_ok()))
        })
    });
    if bad_course_ids {
        errors.push(("courseIds", "Course ids must be a list of valid ids".to_string()));
    }
    if text("department").is_none_or(str::is_empty) {
        errors.push(("department", "Department is required".to_string()));
    }
    if map.get("tags").is_some_and(|v| !is_string_list(v)) {
        errors.push(("tags", "Tags must be a list of strings".to_string()));
    }
    if text("title").is_none() {
        errors.push(("title", "Title is required".to_string()));
    }

    match errors.into_iter().min_by(|a, b| a.0.cmp(b.0)) {
        Some((field, message)) => Err(LibraryError::validation(field, message)),
        None => Ok(()),
    }
}
