use std::sync::Arc;
use std::time::Duration;

use super::rate_limit::RateLimiter;
use crate::admin::AdminService;
use crate::cache::AggregateCache;
use crate::catalog::{DeliveryService, ResourceRepository};
use crate::config::{AppConfig, UploadConfig};
use crate::db::{Database, LibraryStore};
use crate::requests::RequestService;
use crate::storage::BlobStore;
use crate::user_auth::UserAuthService;

/// Gateway 应用状态 (共享)
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<UserAuthService>,
    pub resources: Arc<ResourceRepository>,
    pub delivery: Arc<DeliveryService>,
    pub requests: Arc<RequestService>,
    pub admin: Arc<AdminService>,
    /// Keyed by user id
    pub download_limiter: Arc<RateLimiter>,
    /// Keyed by client IP
    pub search_limiter: Arc<RateLimiter>,
    pub uploads: UploadConfig,
    /// Present when running against PostgreSQL; pinged by the health check
    pub pg_db: Option<Arc<Database>>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn LibraryStore>,
        blobs: Arc<dyn BlobStore>,
        cache: AggregateCache,
        pg_db: Option<Arc<Database>>,
    ) -> Self {
        let limits = &config.rate_limit;
        Self {
            auth: Arc::new(UserAuthService::new(store.clone(), config.auth.clone())),
            resources: Arc::new(ResourceRepository::new(
                store.clone(),
                blobs.clone(),
                cache.clone(),
            )),
            delivery: Arc::new(DeliveryService::new(store.clone(), blobs)),
            requests: Arc::new(RequestService::new(store.clone(), cache.clone())),
            admin: Arc::new(AdminService::new(store, cache)),
            download_limiter: Arc::new(RateLimiter::new(
                "downloads",
                limits.download_max,
                Duration::from_secs(limits.download_window_secs),
            )),
            search_limiter: Arc::new(RateLimiter::new(
                "search",
                limits.search_max,
                Duration::from_secs(limits.search_window_secs),
            )),
            uploads: config.uploads.clone(),
            pg_db,
        }
    }
}
