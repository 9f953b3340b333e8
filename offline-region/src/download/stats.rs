//! Download statistics aggregation.
//!
//! Lock-free atomic counters folded from concurrently completing fetches,
//! and the immutable [`DownloadSummary`] taken once a run has settled.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use super::outcome::{DownloadOutcome, FetchError};

/// Final statistics for one download run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    /// Tiles whose fetch was dispatched.
    pub tiles_attempted: u64,
    /// Tiles that ended in failure, cancelled fetches included.
    pub tiles_failed: u64,
    /// In-flight fetches aborted by cancellation.
    pub tiles_cancelled: u64,
    /// Body bytes received from the network.
    pub bytes_downloaded: u64,
    /// Body bytes served from the HTTP cache.
    pub bytes_from_cache: u64,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl DownloadSummary {
    /// Elapsed wall-clock time in whole milliseconds.
    pub fn elapsed_millis(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    /// Tiles that ended in success.
    pub fn tiles_succeeded(&self) -> u64 {
        self.tiles_attempted - self.tiles_failed
    }
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tiles ({} failed), {} bytes downloaded, {} bytes from cache in {}ms",
            self.tiles_attempted,
            self.tiles_failed,
            self.bytes_downloaded,
            self.bytes_from_cache,
            self.elapsed_millis()
        )
    }
}

/// Concurrency-safe outcome counters.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    tiles_attempted: AtomicU64,
    tiles_failed: AtomicU64,
    tiles_cancelled: AtomicU64,
    bytes_downloaded: AtomicU64,
    bytes_from_cache: AtomicU64,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one outcome into the counters.
    pub fn record(&self, outcome: &DownloadOutcome) {
        self.tiles_attempted.fetch_add(1, Ordering::SeqCst);

        match outcome {
            DownloadOutcome::Success {
                from_cache: true,
                byte_size,
            } => {
                self.bytes_from_cache.fetch_add(*byte_size, Ordering::SeqCst);
            }
            DownloadOutcome::Success {
                from_cache: false,
                byte_size,
            } => {
                self.bytes_downloaded.fetch_add(*byte_size, Ordering::SeqCst);
            }
            DownloadOutcome::Failure { reason } => {
                self.tiles_failed.fetch_add(1, Ordering::SeqCst);
                if matches!(reason, FetchError::Cancelled) {
                    self.tiles_cancelled.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }

    /// Number of outcomes recorded so far.
    pub fn settled(&self) -> u64 {
        self.tiles_attempted.load(Ordering::SeqCst)
    }

    /// Takes the summary. Only meaningful once every record has happened.
    pub fn snapshot(&self, elapsed: Duration) -> DownloadSummary {
        DownloadSummary {
            tiles_attempted: self.tiles_attempted.load(Ordering::SeqCst),
            tiles_failed: self.tiles_failed.load(Ordering::SeqCst),
            tiles_cancelled: self.tiles_cancelled.load(Ordering::SeqCst),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::SeqCst),
            bytes_from_cache: self.bytes_from_cache.load(Ordering::SeqCst),
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn success(from_cache: bool, byte_size: u64) -> DownloadOutcome {
        DownloadOutcome::Success {
            from_cache,
            byte_size,
        }
    }

    #[test]
    fn test_record_splits_bytes_by_source() {
        let stats = StatsAggregator::new();
        stats.record(&success(false, 1000));
        stats.record(&success(true, 250));
        stats.record(&DownloadOutcome::Failure {
            reason: FetchError::InvalidUrl {
                url: "::".to_string(),
                reason: "relative URL without a base".to_string(),
            },
        });

        let summary = stats.snapshot(Duration::from_millis(5));
        assert_eq!(summary.tiles_attempted, 3);
        assert_eq!(summary.tiles_failed, 1);
        assert_eq!(summary.tiles_cancelled, 0);
        assert_eq!(summary.bytes_downloaded, 1000);
        assert_eq!(summary.bytes_from_cache, 250);
        assert_eq!(summary.elapsed_millis(), 5);
        assert_eq!(summary.tiles_succeeded(), 2);
    }

    #[test]
    fn test_cancelled_counts_as_failed() {
        let stats = StatsAggregator::new();
        stats.record(&DownloadOutcome::Failure {
            reason: FetchError::Cancelled,
        });

        let summary = stats.snapshot(Duration::ZERO);
        assert_eq!(summary.tiles_failed, 1);
        assert_eq!(summary.tiles_cancelled, 1);
    }

    #[test]
    fn test_concurrent_records() {
        let stats = Arc::new(StatsAggregator::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record(&success(i % 2 == 0, 3));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = stats.snapshot(Duration::ZERO);
        assert_eq!(summary.tiles_attempted, 8000);
        assert_eq!(summary.bytes_downloaded, 12_000);
        assert_eq!(summary.bytes_from_cache, 12_000);
        assert_eq!(stats.settled(), 8000);
    }

    #[test]
    fn test_summary_display() {
        let summary = DownloadSummary {
            tiles_attempted: 5,
            tiles_failed: 2,
            tiles_cancelled: 0,
            bytes_downloaded: 3000,
            bytes_from_cache: 0,
            elapsed: Duration::from_millis(42),
        };
        assert_eq!(
            summary.to_string(),
            "5 tiles (2 failed), 3000 bytes downloaded, 0 bytes from cache in 42ms"
        );
    }
}
