//! Resource data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::account::UserRef;
use crate::pagination::{PageWindow, SortOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceCategory {
    Book,
    Journal,
    Paper,
    Magazine,
    Thesis,
    Other,
}

impl ResourceCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceCategory::Book => "BOOK",
            ResourceCategory::Journal => "JOURNAL",
            ResourceCategory::Paper => "PAPER",
            ResourceCategory::Magazine => "MAGAZINE",
            ResourceCategory::Thesis => "THESIS",
            ResourceCategory::Other => "OTHER",
        }
    }
}

impl FromStr for ResourceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOK" => Ok(ResourceCategory::Book),
            "JOURNAL" => Ok(ResourceCategory::Journal),
            "PAPER" => Ok(ResourceCategory::Paper),
            "MAGAZINE" => Ok(ResourceCategory::Magazine),
            "THESIS" => Ok(ResourceCategory::Thesis),
            "OTHER" => Ok(ResourceCategory::Other),
            other => Err(format!("Unknown category: {}", other)),
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery policy. VIEW_ONLY resources can be previewed but never downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessType {
    ViewOnly,
    #[default]
    Downloadable,
}

impl AccessType {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessType::ViewOnly => "VIEW_ONLY",
            AccessType::Downloadable => "DOWNLOADABLE",
        }
    }
}

impl FromStr for AccessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VIEW_ONLY" => Ok(AccessType::ViewOnly),
            "DOWNLOADABLE" => Ok(AccessType::Downloadable),
            other => Err(format!("Unknown access type: {}", other)),
        }
    }
}

/// Reference to an uploaded blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlob {
    pub public_id: String,
    pub secure_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub authors: Vec<String>,
    pub category: ResourceCategory,
    pub department: String,
    pub publication_year: Option<i32>,
    pub access_type: AccessType,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub download_count: i64,
    pub view_count: i64,
    pub cloudinary_id: Option<String>,
    pub cloudinary_url: Option<String>,
    pub cover_image_id: Option<String>,
    pub cover_image_url: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub uploaded_by_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    pub fn has_blob(&self) -> bool {
        self.cloudinary_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub id: Uuid,
    pub code: String,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize, validator::Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    #[validate(length(min = 2, max = 20, message = "Course code must be between 2 and 20 characters"))]
    pub code: String,
    #[validate(length(min = 3, max = 200, message = "Course title must be between 3 and 200 characters"))]
    pub title: String,
}

/// Resource with uploader and course associations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDetail {
    #[serde(flatten)]
    pub resource: Resource,
    pub uploaded_by: UserRef,
    pub courses: Vec<CourseSummary>,
}

/// Listing row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceListItem {
    #[serde(flatten)]
    pub resource: Resource,
    pub uploaded_by: UserRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingResource {
    pub id: Uuid,
    pub title: String,
    pub authors: Vec<String>,
    pub category: ResourceCategory,
    pub department: String,
    pub download_count: i64,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestResource {
    pub id: Uuid,
    pub title: String,
    pub authors: Vec<String>,
    pub category: ResourceCategory,
    pub department: String,
    pub created_at: DateTime<Utc>,
}

/// Row to insert; blobs are already uploaded when this is built
#[derive(Debug, Clone)]
pub struct NewResource {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub authors: Vec<String>,
    pub category: ResourceCategory,
    pub department: String,
    pub publication_year: Option<i32>,
    pub access_type: AccessType,
    pub tags: Vec<String>,
    pub uploaded_by_id: Uuid,
    pub file: Option<StoredBlob>,
    pub cover: Option<StoredBlob>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
}

/// Partial update. `course_ids`, when present, replaces the whole association set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, validator::Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 3, max = 200, message = "Title must be between 3 and 200 characters"))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 2000, message = "Description must be less than 2000 characters"))]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "At least one author is required"))]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ResourceCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200, message = "Department is required"))]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_type: Option<AccessType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_ids: Option<Vec<Uuid>>,
}

impl ResourcePatch {
    /// Apply column changes (not courses) to an in-memory row
    pub fn apply_to(&self, resource: &mut Resource) {
        if let Some(title) = &self.title {
            resource.title = title.clone();
        }
        if let Some(description) = &self.description {
            resource.description = Some(description.clone());
        }
        if let Some(authors) = &self.authors {
            resource.authors = authors.clone();
        }
        if let Some(category) = self.category {
            resource.category = category;
        }
        if let Some(department) = &self.department {
            resource.department = department.clone();
        }
        if let Some(year) = self.publication_year {
            resource.publication_year = Some(year);
        }
        if let Some(access_type) = self.access_type {
            resource.access_type = access_type;
        }
        if let Some(tags) = &self.tags {
            resource.tags = tags.clone();
        }
        if let Some(is_active) = self.is_active {
            resource.is_active = is_active;
        }
        resource.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ResourceSortField {
    #[default]
    CreatedAt,
    Title,
    DownloadCount,
    ViewCount,
}

impl ResourceSortField {
    pub fn column(self) -> &'static str {
        match self {
            ResourceSortField::CreatedAt => "created_at",
            ResourceSortField::Title => "title",
            ResourceSortField::DownloadCount => "download_count",
            ResourceSortField::ViewCount => "view_count",
        }
    }
}

/// Listing filters as they arrive on the query string
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ResourceCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_type: Option<AccessType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Uuid>,
    #[serde(default)]
    pub sort_by: ResourceSortField,
    #[serde(default)]
    pub sort_order: SortOrder,
}

impl ResourceQuery {
    pub fn window(&self) -> PageWindow {
        PageWindow::new(self.page, self.limit)
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Row predicate; only active resources are ever listed
    pub fn matches(&self, resource: &Resource) -> bool {
        if !resource.is_active {
            return false;
        }
        if let Some(term) = self.search_term() {
            let needle = term.to_lowercase();
            let in_title = resource.title.to_lowercase().contains(&needle);
            let in_description = resource
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_title && !in_description {
                return false;
            }
        }
        if let Some(department) = &self.department
            && !resource
                .department
                .to_lowercase()
                .contains(&department.to_lowercase())
        {
            return false;
        }
        self.category.is_none_or(|c| c == resource.category)
            && self.year.is_none_or(|y| resource.publication_year == Some(y))
            && self.tag.as_ref().is_none_or(|t| resource.tags.contains(t))
            && self.author.as_ref().is_none_or(|a| resource.authors.contains(a))
            && self.access_type.is_none_or(|a| a == resource.access_type)
    }
}

/// One granted download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub resource_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Caller-side facts recorded with a download
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Signed, time-limited delivery URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryGrant {
    pub url: String,
    /// Seconds until the URL stops working
    pub expires_in: u64,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn resource(title: &str) -> Resource {
        let now = Utc::now();
        Resource {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            authors: vec!["Knuth".to_string()],
            category: ResourceCategory::Book,
            department: "Computer Science".to_string(),
            publication_year: Some(1968),
            access_type: AccessType::Downloadable,
            tags: vec!["algorithms".to_string()],
            is_active: true,
            download_count: 0,
            view_count: 0,
            cloudinary_id: Some("e-library/resources/taocp".to_string()),
            cloudinary_url: Some("https://cdn.example/taocp".to_string()),
            cover_image_id: None,
            cover_image_url: None,
            file_type: Some("application/pdf".to_string()),
            file_size: Some(1024),
            uploaded_by_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }
}
