//! Optional in-memory caches for block metadata and block bytes.

use std::sync::Arc;

use blockswap_core::Metrics;
use blockswap_core::metrics::names;
use bytes::Bytes;
use moka::policy::EvictionPolicy;
use moka::sync::{Cache, CacheBuilder};

use crate::config::BackendConfig;
use crate::types::BlockInfo;

/// Key of a cached blob range.
pub type RangeKey = (String, u64, u64);

/// Bounded LRU caches, each present only when enabled.
///
/// Entries are inserted only after a successful fetch; misses are never
/// cached.
#[derive(Debug, Clone)]
pub struct BlockCaches {
    info: Option<Cache<String, BlockInfo>>,
    data: Option<Cache<RangeKey, Bytes>>,
    metrics: Arc<dyn Metrics>,
}

impl BlockCaches {
    /// Build the caches the configuration enables.
    #[must_use]
    pub fn new(config: &BackendConfig, metrics: Arc<dyn Metrics>) -> Self {
        let info = config.cache_block_info.then(|| {
            CacheBuilder::default()
                .max_capacity(config.cache_block_info_size.max(1))
                .eviction_policy(EvictionPolicy::lru())
                .build()
        });
        let data = config.cache_block_data.then(|| {
            CacheBuilder::default()
                .max_capacity(config.cache_block_data_size.max(1))
                .weigher(|_key: &RangeKey, value: &Bytes| u32::try_from(value.len()).unwrap_or(u32::MAX))
                .eviction_policy(EvictionPolicy::lru())
                .build()
        });
        Self { info, data, metrics }
    }

    /// Cached metadata for `key`.
    #[must_use]
    pub fn get_info(&self, key: &str) -> Option<BlockInfo> {
        let cache = self.info.as_ref()?;
        self.observe(cache.get(key))
    }

    /// Remember metadata for `key`.
    pub fn put_info(&self, key: &str, info: &BlockInfo) {
        if let Some(cache) = &self.info {
            cache.insert(key.to_owned(), info.clone());
        }
    }

    /// Cached bytes for a blob range.
    #[must_use]
    pub fn get_data(&self, key: &RangeKey) -> Option<Bytes> {
        let cache = self.data.as_ref()?;
        self.observe(cache.get(key))
    }

    /// Remember bytes for a blob range.
    pub fn put_data(&self, key: RangeKey, data: &Bytes) {
        if let Some(cache) = &self.data {
            cache.insert(key, data.clone());
        }
    }

    fn observe<T>(&self, value: Option<T>) -> Option<T> {
        let name = if value.is_some() { names::CACHE_HITS } else { names::CACHE_MISSES };
        self.metrics.increase(name, 1);
        value
    }
}

#[cfg(test)]
mod tests {
    use blockswap_core::RecordingMetrics;

    use super::*;

    fn info() -> BlockInfo {
        BlockInfo {
            offset: 10,
            length: 20,
            locator: "us-east-1/bucket/a.car".to_owned(),
        }
    }

    #[test]
    fn test_should_skip_lookups_when_disabled() {
        let metrics = Arc::new(RecordingMetrics::default());
        let caches = BlockCaches::new(&BackendConfig::default(), metrics.clone());

        caches.put_info("k", &info());
        assert!(caches.get_info("k").is_none());
        assert_eq!(metrics.value(names::CACHE_MISSES), 0);
    }

    #[test]
    fn test_should_count_hits_and_misses() {
        let metrics = Arc::new(RecordingMetrics::default());
        let config = BackendConfig::builder().cache_block_info(true).cache_block_data(true).build();
        let caches = BlockCaches::new(&config, metrics.clone());

        assert!(caches.get_info("k").is_none());
        caches.put_info("k", &info());
        assert_eq!(caches.get_info("k"), Some(info()));

        let range = ("loc".to_owned(), 0, 4);
        caches.put_data(range.clone(), &Bytes::from_static(b"abcd"));
        assert_eq!(caches.get_data(&range), Some(Bytes::from_static(b"abcd")));

        assert_eq!(metrics.value(names::CACHE_HITS), 2);
        assert_eq!(metrics.value(names::CACHE_MISSES), 1);
    }
}
