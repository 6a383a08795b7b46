//! Aggregate Cache
//!
//! Read-through cache for trending, latest, search listings and admin
//! metrics. The cache is never a correctness dependency: any backend
//! failure falls through to computing the value directly.
//!
//! Invalidation is coarse. A resource mutation drops every key in the
//! `trending:`, `latest:` and `search:` namespaces by prefix scan. Metrics
//! are dropped only by the admin and request services.

pub mod local;

pub use local::LocalCache;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::error::LibraryResult;

pub const TRENDING_PREFIX: &str = "trending:";
pub const LATEST_PREFIX: &str = "latest:";
pub const SEARCH_PREFIX: &str = "search:";
pub const METRICS_KEY: &str = "admin:metrics";

/// Namespaces dropped on any resource mutation
pub const RESOURCE_VIEW_PREFIXES: [&str; 3] = [TRENDING_PREFIX, LATEST_PREFIX, SEARCH_PREFIX];

pub fn trending_key(limit: i64) -> String {
    format!("{}{}", TRENDING_PREFIX, limit)
}

pub fn latest_key(limit: i64) -> String {
    format!("{}{}", LATEST_PREFIX, limit)
}

/// `search:<canonical query>`; the query is serialized with a fixed field order
pub fn search_key<Q: Serialize>(query: &Q) -> Result<String, serde_json::Error> {
    Ok(format!("{}{}", SEARCH_PREFIX, serde_json::to_string(query)?))
}

#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Key/value store with per-key TTL and prefix listing
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
}

#[derive(Clone)]
pub struct AggregateCache {
    backend: Option<Arc<dyn CacheBackend>>,
    ttl: Duration,
}

impl AggregateCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend: Some(backend),
            ttl,
        }
    }

    /// Every read computes
    pub fn disabled() -> Self {
        Self {
            backend: None,
            ttl: Duration::ZERO,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value under `key`, or compute, store and return it.
    ///
    /// Errors from `compute` propagate and nothing is stored.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, compute: F) -> LibraryResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = LibraryResult<T>>,
    {
        let Some(backend) = &self.backend else {
            return compute().await;
        };

        match backend.get(key).await {
            Ok(Some(payload)) => match serde_json::from_str::<T>(&payload) {
                Ok(value) => {
                    tracing::debug!(key, "[cache] hit");
                    return Ok(value);
                }
                Err(e) => tracing::warn!(key, "[cache] undecodable entry, recomputing: {}", e),
            },
            Ok(None) => tracing::debug!(key, "[cache] miss"),
            Err(e) => tracing::error!(key, "[cache] read failed, falling through: {}", e),
        }

        let value = compute().await?;

        match serde_json::to_string(&value) {
            Ok(payload) => {
                if let Err(e) = backend.set_ex(key, payload, self.ttl).await {
                    tracing::error!(key, "[cache] write failed: {}", e);
                }
            }
            Err(e) => tracing::error!(key, "[cache] value not serializable: {}", e),
        }
        Ok(value)
    }

    /// Drop every trending, latest and search entry
    pub async fn invalidate_resource_views(&self) {
        for prefix in RESOURCE_VIEW_PREFIXES {
            self.invalidate_prefix(prefix).await;
        }
    }

    pub async fn invalidate_metrics(&self) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.delete(&[METRICS_KEY.to_string()]).await {
            tracing::error!("[cache] failed to drop {}: {}", METRICS_KEY, e);
        }
    }

    async fn invalidate_prefix(&self, prefix: &str) {
        let Some(backend) = &self.backend else {
            return;
        };
        let keys = match backend.keys_with_prefix(prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(prefix, "[cache] key scan failed: {}", e);
                return;
            }
        };
        if keys.is_empty() {
            return;
        }
        match backend.delete(&keys).await {
            Ok(()) => tracing::debug!(prefix, count = keys.len(), "[cache] invalidated"),
            Err(e) => tracing::error!(prefix, "[cache] delete failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LibraryError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DownBackend;

    #[async_trait]
    impl CacheBackend for DownBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn set_ex(&self, _k: &str, _v: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn delete(&self, _keys: &[String]) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn keys_with_prefix(&self, _prefix: &str) -> Result<Vec<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    fn local() -> (Arc<LocalCache>, AggregateCache) {
        let backend = Arc::new(LocalCache::new());
        let cache = AggregateCache::new(backend.clone(), Duration::from_secs(300));
        (backend, cache)
    }

    #[tokio::test]
    async fn test_read_through_computes_once() {
        let (_, cache) = local();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        for _ in 0..3 {
            let v: Vec<i32> = cache
                .get_or_compute(&trending_key(10), || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(v, vec![1, 2, 3]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_compute_error_is_not_cached() {
        let (backend, cache) = local();
        let res: LibraryResult<i32> = cache
            .get_or_compute("latest:10", || async {
                Err(LibraryError::Database("down".into()))
            })
            .await;
        assert!(res.is_err());
        assert_eq!(backend.get("latest:10").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalidate_resource_views_keeps_metrics() {
        let (backend, cache) = local();
        let ttl = Duration::from_secs(60);
        for key in ["trending:10", "latest:5", "search:{\"search\":\"rust\"}", METRICS_KEY] {
            backend.set_ex(key, "0".into(), ttl).await.unwrap();
        }

        cache.invalidate_resource_views().await;

        assert_eq!(backend.get("trending:10").await.unwrap(), None);
        assert_eq!(backend.get("latest:5").await.unwrap(), None);
        assert!(backend.keys_with_prefix(SEARCH_PREFIX).await.unwrap().is_empty());
        assert!(backend.get(METRICS_KEY).await.unwrap().is_some());

        cache.invalidate_metrics().await;
        assert_eq!(backend.get(METRICS_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreachable_backend_falls_through() {
        let cache = AggregateCache::new(Arc::new(DownBackend), Duration::from_secs(300));
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        for _ in 0..2 {
            let v: String = cache
                .get_or_compute(METRICS_KEY, || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok("fresh".to_string())
                })
                .await
                .unwrap();
            assert_eq!(v, "fresh");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        cache.invalidate_resource_views().await;
        cache.invalidate_metrics().await;
    }

    #[test]
    fn test_keys() {
        assert_eq!(trending_key(10), "trending:10");
        assert_eq!(latest_key(3), "latest:3");
        let key = search_key(&serde_json::json!({"search": "rust"})).unwrap();
        assert!(key.starts_with(SEARCH_PREFIX));
    }
}
