//! Downloader configuration.

use std::time::Duration;

use crate::http::RequestCacheControl;

/// Default number of tile fetches kept in flight.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// Settings for [`DownloadOrchestrator`](super::DownloadOrchestrator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderConfig {
    /// Upper bound on simultaneously in-flight tile fetches (at least 1).
    pub max_concurrent_fetches: usize,
    /// Cache directives attached to every tile request.
    pub cache_control: RequestCacheControl,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            cache_control: RequestCacheControl::default(),
        }
    }
}

impl DownloaderConfig {
    /// Sets the in-flight bound; values below 1 are raised to 1.
    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max.max(1);
        self
    }

    /// Replaces the request cache directives.
    pub fn with_cache_control(mut self, cache_control: RequestCacheControl) -> Self {
        self.cache_control = cache_control;
        self
    }

    /// Shorthand for accepting cached tiles up to `max_stale` past expiry.
    pub fn with_max_stale(mut self, max_stale: Duration) -> Self {
        self.cache_control = self.cache_control.with_max_stale(max_stale);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_concurrency() {
        assert_eq!(DownloaderConfig::default().max_concurrent_fetches, 8);
    }

    #[test]
    fn test_min_concurrency() {
        let config = DownloaderConfig::default().with_max_concurrent_fetches(0);
        assert_eq!(config.max_concurrent_fetches, 1);
    }

    #[test]
    fn test_max_stale_shorthand() {
        let config = DownloaderConfig::default().with_max_stale(Duration::from_secs(3600));
        assert_eq!(
            config.cache_control.header_value().as_deref(),
            Some("max-stale=3600")
        );
    }
}
