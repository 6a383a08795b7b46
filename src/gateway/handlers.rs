//! HTTP handlers, one module per resource

pub mod admin;
pub mod courses;
pub mod health;
pub mod helpers;
pub mod requests;
pub mod resources;

pub use health::{HealthResponse, health_check};
pub use helpers::{ClientIp, LimitParams, MaybeClaims};
