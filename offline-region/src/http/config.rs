//! HTTP client configuration.

use std::time::Duration;

/// Transport identifier appended to the User-Agent.
///
/// Tracks the `reqwest` requirement in this crate's `Cargo.toml`; bump both
/// together.
pub const TRANSPORT_VERSION: &str = "reqwest/0.12";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of idle keep-alive connections kept per tile host.
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 16;

/// Settings for [`CachingHttpClient`](super::CachingHttpClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientConfig {
    /// Application identifier sent in the User-Agent.
    pub app_id: String,
    /// Application version sent in the User-Agent.
    pub app_version: String,
    /// Whole-request timeout applied by reqwest.
    pub timeout: Duration,
    /// Idle connections retained per host.
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            app_id: env!("CARGO_PKG_NAME").to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
        }
    }
}

impl HttpClientConfig {
    /// Identify requests as coming from the given application.
    pub fn with_app(mut self, app_id: impl Into<String>, app_version: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self.app_version = app_version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pool_max_idle_per_host(mut self, idle: usize) -> Self {
        self.pool_max_idle_per_host = idle;
        self
    }

    /// `"<app-id>/<app-version> / <transport-version>"`
    pub fn user_agent(&self) -> String {
        format!("{}/{} / {}", self.app_id, self.app_version, TRANSPORT_VERSION)
    }
}
