//! E-Library - course resource library service
//!
//! # Modules
//!
//! - [`catalog`] - Resources, courses, upload validation and signed delivery
//! - [`requests`] - Requests for missing resources
//! - [`admin`] - User administration, dashboard metrics, audit listing
//! - [`user_auth`] - Passwords, access/refresh tokens, auth middleware
//! - [`audit`] - Audit entries written with each mutation
//! - [`cache`] - TTL cache for aggregate views
//! - [`storage`] - Blob store collaborator
//! - [`db`] - PostgreSQL and in-memory stores
//! - [`gateway`] - HTTP API (axum)
//! - [`client`] - API client with single-flight token refresh

// Foundations
pub mod config;
pub mod error;
pub mod logging;
pub mod pagination;

// Domain
pub mod account;
pub mod admin;
pub mod audit;
pub mod catalog;
pub mod requests;
pub mod user_auth;

// Infrastructure
pub mod cache;
pub mod db;
pub mod storage;

// Surfaces
pub mod client;
pub mod gateway;

// Convenient re-exports at crate root
pub use account::{Role, User};
pub use error::{LibraryError, LibraryResult};
