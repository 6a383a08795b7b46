//! Gateway types module
//!
//! ## Input Types
//! - [`ResourceUpload`]: Axum extractor that validates multipart uploads
//!
//! ## Output Types
//! - [`ApiResponse<T>`]: Unified API response wrapper
//!
//! ## Submodules
//! - [`response`]: Response types and error codes
//! - [`upload`]: Multipart upload extraction

pub mod response;
pub mod upload;

pub use response::{ApiResponse, error_codes};
pub use upload::{COVER_FIELD, FILE_FIELD, ResourceUpload};
