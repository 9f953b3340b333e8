//! In-memory response store using moka.
//!
//! Entries are weighted by body size so the store stays within its byte
//! budget; moka evicts least-recently-used entries automatically.

use moka::future::Cache as MokaCache;

use super::{BoxFuture, CachedResponse, HttpCacheError, HttpCacheStore};

/// Default memory budget: 256 MiB.
pub const DEFAULT_MEMORY_CACHE_BYTES: u64 = 256 * 1024 * 1024;

/// Process-local response store.
#[derive(Clone)]
pub struct MemoryHttpCache {
    cache: MokaCache<String, CachedResponse>,
    max_size_bytes: u64,
}

impl MemoryHttpCache {
    /// Creates a store holding at most `max_size_bytes` of response bodies.
    pub fn new(max_size_bytes: u64) -> Self {
        let cache = MokaCache::builder()
            .weigher(|_key: &String, value: &CachedResponse| -> u32 {
                // moka uses u32 for weights, cap at u32::MAX for very large entries
                value.body.len().min(u32::MAX as usize) as u32
            })
            .max_capacity(max_size_bytes)
            .build();

        Self {
            cache,
            max_size_bytes,
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Flushes pending moka maintenance so counts are exact.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl Default for MemoryHttpCache {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CACHE_BYTES)
    }
}

impl HttpCacheStore for MemoryHttpCache {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<CachedResponse>, HttpCacheError>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.cache.get(&key).await) })
    }

    fn put(&self, key: &str, response: CachedResponse) -> BoxFuture<'_, Result<(), HttpCacheError>> {
        let key = key.to_string();
        Box::pin(async move {
            self.cache.insert(key, response).await;
            Ok(())
        })
    }
}
