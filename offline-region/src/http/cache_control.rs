//! Cache-Control directives for responses and requests.

use std::time::Duration;

/// Directives parsed from a response `Cache-Control` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub max_age: Option<Duration>,
    pub no_cache: bool,
    pub no_store: bool,
    pub must_revalidate: bool,
}

impl CacheControl {
    /// Parses a `Cache-Control` header value. Unknown directives are ignored.
    pub fn parse(header: &str) -> Self {
        let mut control = Self::default();

        for directive in header.split(',') {
            let directive = directive.trim().to_ascii_lowercase();

            match directive.as_str() {
                "no-cache" => control.no_cache = true,
                "no-store" => control.no_store = true,
                "must-revalidate" => control.must_revalidate = true,
                _ => {
                    if let Some(seconds) = directive.strip_prefix("max-age=") {
                        if let Ok(seconds) = seconds.trim_matches('"').parse::<u64>() {
                            control.max_age = Some(Duration::from_secs(seconds));
                        }
                    }
                }
            }
        }

        control
    }

    /// Whether a response carrying these directives may be stored.
    pub fn is_storable(&self) -> bool {
        !self.no_store
    }

    /// How long a stored response may be served without revalidation.
    pub fn freshness_lifetime(&self) -> Duration {
        if self.no_cache {
            return Duration::ZERO;
        }
        self.max_age.unwrap_or(Duration::ZERO)
    }

    /// Whether stale responses may be served under a client's `max-stale`.
    pub fn allows_stale(&self) -> bool {
        !self.must_revalidate && !self.no_cache
    }
}

/// Directives the downloader attaches to every tile request.
///
/// `max_stale` lets the cache answer with an expired entry as long as it has
/// been stale for less than the given duration, trading freshness for fewer
/// round trips on repeated region downloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCacheControl {
    pub max_stale: Option<Duration>,
    pub no_cache: bool,
}

impl RequestCacheControl {
    /// Accept cached tiles up to `max_stale` past their expiry.
    pub fn with_max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = Some(max_stale);
        self
    }

    /// Always revalidate with the server.
    pub fn with_no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    /// Renders the directives as a request `Cache-Control` value.
    pub fn header_value(&self) -> Option<String> {
        let mut directives = Vec::new();
        if self.no_cache {
            directives.push("no-cache".to_string());
        }
        if let Some(max_stale) = self.max_stale {
            directives.push(format!("max-stale={}", max_stale.as_secs()));
        }

        if directives.is_empty() {
            None
        } else {
            Some(directives.join(", "))
        }
    }
}
