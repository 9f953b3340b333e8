//! Region download: per-tile fetches, bounded concurrency and statistics.
//!
//! [`DownloadOrchestrator`] enumerates the tiles of a bounding box, hands
//! each one to a [`TileFetcher`] and folds the [`DownloadOutcome`]s into a
//! [`DownloadSummary`]. Downloaded bodies are discarded; the point of a run
//! is to populate the HTTP cache that the map renderer reads from.

mod config;
mod fetcher;
mod orchestrator;
mod outcome;
mod stats;

pub use config::{DownloaderConfig, DEFAULT_MAX_CONCURRENT_FETCHES};
pub use fetcher::{TileFetcher, CACHE_KEY_MARKER};
pub use orchestrator::{DownloadOrchestrator, DownloadProgress, ProgressCallback};
pub use outcome::{DownloadError, DownloadOutcome, FetchError};
pub use stats::{DownloadSummary, StatsAggregator};
