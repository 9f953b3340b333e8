//! Storage backends for the HTTP response cache.
//!
//! The [`HttpCacheStore`] trait is a small key-value interface keyed by the
//! exact request URL. Freshness decisions live in the HTTP client; stores only
//! persist what they are given.
//!
//! - [`MemoryHttpCache`]: process-local, size-bounded (moka)
//! - [`DiskHttpCache`]: persistent, one body + metadata file pair per URL

mod disk;
mod memory;

pub use disk::DiskHttpCache;
pub use memory::MemoryHttpCache;

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use thiserror::Error;

use super::cache_control::CacheControl;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors raised by cache stores.
#[derive(Debug, Error)]
pub enum HttpCacheError {
    /// I/O error while reading or writing cache files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored metadata could not be encoded or decoded.
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Background write task panicked or was aborted.
    #[error("Cache write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A stored response with the validators needed to revalidate it.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub body: Bytes,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub control: CacheControl,
    pub stored_at: SystemTime,
}

impl CachedResponse {
    /// Time since the response was stored or last revalidated.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.stored_at).unwrap_or_default()
    }

    pub fn is_fresh(&self, now: SystemTime) -> bool {
        self.age(now) < self.control.freshness_lifetime()
    }

    /// Whether the entry may still be served when the client tolerates
    /// `max_stale` of staleness.
    pub fn is_within_max_stale(&self, now: SystemTime, max_stale: Duration) -> bool {
        self.control.allows_stale()
            && self.age(now) < self.control.freshness_lifetime().saturating_add(max_stale)
    }

    /// Whether a conditional request can be built from this entry.
    pub fn has_validators(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

/// Key-value storage for cached HTTP responses.
///
/// Dyn-compatible so the client can hold an `Arc<dyn HttpCacheStore>`.
pub trait HttpCacheStore: Send + Sync {
    /// Looks up the response stored for `key`.
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<CachedResponse>, HttpCacheError>>;

    /// Stores or replaces the response for `key`.
    fn put(&self, key: &str, response: CachedResponse) -> BoxFuture<'_, Result<(), HttpCacheError>>;
}

#[cfg(test)]
pub(crate) fn sample_response(body: &'static [u8], max_age_secs: u64) -> CachedResponse {
    CachedResponse {
        body: Bytes::from_static(body),
        etag: Some("\"v1\"".to_string()),
        last_modified: None,
        control: CacheControl {
            max_age: Some(Duration::from_secs(max_age_secs)),
            ..CacheControl::default()
        },
        stored_at: SystemTime::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_within_max_age() {
        let response = sample_response(b"tile", 60);
        assert!(response.is_fresh(SystemTime::now()));
        assert!(!response.is_fresh(response.stored_at + Duration::from_secs(61)));
    }

    #[test]
    fn test_max_stale_extends_lifetime() {
        let response = sample_response(b"tile", 60);
        let later = response.stored_at + Duration::from_secs(90);
        assert!(!response.is_fresh(later));
        assert!(response.is_within_max_stale(later, Duration::from_secs(60)));
        assert!(!response.is_within_max_stale(later, Duration::from_secs(10)));
    }

    #[test]
    fn test_must_revalidate_forbids_stale() {
        let mut response = sample_response(b"tile", 60);
        response.control.must_revalidate = true;
        let later = response.stored_at + Duration::from_secs(61);
        assert!(!response.is_within_max_stale(later, Duration::from_secs(3600)));
    }

    #[test]
    fn test_clock_skew_counts_as_zero_age() {
        let response = sample_response(b"tile", 0);
        let earlier = response.stored_at - Duration::from_secs(5);
        assert_eq!(response.age(earlier), Duration::ZERO);
        assert!(response.has_validators());
    }
}
