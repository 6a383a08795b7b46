//! In-process TTL backend

use async_trait::async_trait;
use cached::{Cached, CanExpire, ExpiringValueCache};
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{CacheBackend, CacheError};

/// Upper bound on resident entries
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
struct Entry {
    payload: String,
    expires_at: Instant,
}

impl CanExpire for Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

struct Inner {
    values: ExpiringValueCache<String, Entry>,
    /// Ordered key index for prefix scans
    keys: BTreeSet<String>,
    capacity: usize,
}

impl Inner {
    /// Drop index entries whose value was evicted or has expired.
    /// Runs once the index holds twice the value capacity, so it stays bounded.
    fn prune_keys(&mut self) {
        if self.keys.len() <= self.capacity.saturating_mul(2) {
            return;
        }
        let Inner { values, keys, .. } = self;
        keys.retain(|key| values.cache_get(key).is_some());
    }
}

pub struct LocalCache {
    inner: Mutex<Inner>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                values: ExpiringValueCache::with_size(capacity),
                keys: BTreeSet::new(),
                capacity,
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, CacheError> {
        self.inner
            .lock()
            .map_err(|_| CacheError::Unavailable("local cache lock poisoned".to_string()))
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for LocalCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut inner = self.lock()?;
        let key = key.to_string();
        match inner.values.cache_get(&key) {
            Some(entry) => Ok(Some(entry.payload.clone())),
            None => {
                inner.keys.remove(&key);
                Ok(None)
            }
        }
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut inner = self.lock()?;
        inner.values.cache_set(
            key.to_string(),
            Entry {
                payload: value,
                expires_at: Instant::now() + ttl,
            },
        );
        inner.keys.insert(key.to_string());
        inner.prune_keys();
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        let mut inner = self.lock()?;
        for key in keys {
            inner.values.cache_remove(key);
            inner.keys.remove(key);
        }
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let inner = self.lock()?;
        Ok(inner
            .keys
            .range(prefix.to_string()..)
            .take_while(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = LocalCache::new();
        cache
            .set_ex("trending:10", "[]".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("trending:10").await.unwrap().as_deref(), Some("[]"));

        cache.delete(&["trending:10".to_string()]).await.unwrap();
        assert_eq!(cache.get("trending:10").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = LocalCache::new();
        cache
            .set_ex("latest:5", "[]".into(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("latest:5").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_key_index_stays_bounded() {
        let cache = LocalCache::with_capacity(10);
        for i in 0..1000 {
            cache
                .set_ex(&format!("search:{}", i), "[]".into(), Duration::from_millis(1))
                .await
                .unwrap();
        }
        assert!(cache.inner.lock().unwrap().keys.len() <= 20);

        // Live keys survive pruning
        for i in 0..30 {
            cache
                .set_ex(&format!("latest:{}", i), "[]".into(), Duration::from_secs(60))
                .await
                .unwrap();
        }
        let live = cache.keys_with_prefix("latest:").await.unwrap();
        assert!(live.len() >= 10);
        assert!(cache.inner.lock().unwrap().keys.len() <= 20);
    }

    #[tokio::test]
    async fn test_prefix_scan() {
        let cache = LocalCache::new();
        for key in ["search:a", "search:b", "searches", "trending:10", "admin:metrics"] {
            cache
                .set_ex(key, "1".into(), Duration::from_secs(60))
                .await
                .unwrap();
        }
        let keys = cache.keys_with_prefix("search:").await.unwrap();
        assert_eq!(keys, vec!["search:a".to_string(), "search:b".to_string()]);
    }
}
