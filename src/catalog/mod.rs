//! Resource catalog: records, upload policy, repository and delivery

pub mod delivery;
pub mod models;
pub mod repository;
pub mod validation;

pub use delivery::{DOWNLOAD_URL_TTL_SECS, DeliveryService, PREVIEW_URL_TTL_SECS};
pub use models::{
    AccessContext, AccessType, CourseSummary, DeliveryGrant, DownloadLog, LatestResource,
    NewCourse, NewResource, Resource, ResourceCategory, ResourceDetail, ResourceListItem,
    ResourcePatch, ResourceQuery, ResourceSortField, StoredBlob, TrendingResource,
};
pub use repository::{DEFAULT_SHOWCASE_LIMIT, ResourceRepository};
pub use validation::{ResourceMetadata, UploadedFile};
