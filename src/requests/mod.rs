//! Resource requests raised by readers and answered by admins

pub mod models;
pub mod service;

pub use models::{
    CreateRequestInput, NewRequest, RequestListParams, RequestPatch, RequestQuery,
    RequestSortField, RequestStats, RequestStatus, ResourceRequest, UpdateRequestInput,
};
pub use service::{RECENT_REQUEST_DAYS, RequestService};
