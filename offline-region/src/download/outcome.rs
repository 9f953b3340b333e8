//! Per-tile results and run-level errors.

use thiserror::Error;

use crate::coord::CoordError;
use crate::http::TransportError;

/// Why a single tile fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The tile source produced a URL that does not parse.
    #[error("Invalid tile URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Connection, timeout, TLS or I/O failure.
    #[error("Network failure: {0}")]
    Network(#[from] TransportError),

    /// Aborted because the run was cancelled while the request was in flight.
    #[error("Fetch cancelled")]
    Cancelled,
}

/// Result of one tile fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// A response was received and its body fully read.
    Success {
        /// Body came from the local HTTP cache, directly or after a `304`.
        from_cache: bool,
        /// Length of the response body in bytes.
        byte_size: u64,
    },
    /// No response was obtained.
    Failure { reason: FetchError },
}

impl DownloadOutcome {
    /// Returns `true` for [`DownloadOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadOutcome::Success { .. })
    }
}

/// Errors that prevent a run from starting.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Requested zoom exceeds what the geometry supports.
    #[error("Invalid zoom level {requested} (max {max})")]
    InvalidZoom { requested: u8, max: u8 },

    /// The bounding box could not be mapped to tiles.
    #[error("Tile geometry error: {0}")]
    Geometry(#[from] CoordError),

    /// The HTTP transport could not be created.
    #[error("HTTP client error: {0}")]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_renders() {
        let reason = FetchError::Network(TransportError::Timeout {
            url: "http://t/1/0/0?".to_string(),
        });
        assert_eq!(
            reason.to_string(),
            "Network failure: Request to http://t/1/0/0? timed out"
        );
    }

    #[test]
    fn test_is_success() {
        assert!(DownloadOutcome::Success {
            from_cache: true,
            byte_size: 0
        }
        .is_success());
        assert!(!DownloadOutcome::Failure {
            reason: FetchError::Cancelled
        }
        .is_success());
    }
}
