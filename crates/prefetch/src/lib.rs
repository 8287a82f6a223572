//! # HLS Prefetch Engine
//!
//! Opportunistically pre-downloads HLS playlists and their leading segments
//! before playback asks for them, within limits that depend on the current
//! network class and power state.
//!
//! - [`PrefetchController`]: handle to the single worker that owns the
//!   pending queue and the in-flight set
//! - [`PrefetchPolicy`]: per-network-class item and concurrency budgets
//! - [`EnvironmentMonitor`]: forwards network-class and low-power changes
//! - [`PrefetchBackend`]: the capability that actually fetches a URL, with
//!   [`HttpPrefetchBackend`] and [`NoopPrefetchBackend`] implementations
//!
//! Prefetching is an optimization only. Dropped, cancelled or failed
//! prefetches are never retried; playback simply fetches on demand.

pub mod backend;
pub mod config;
pub mod controller;
pub mod environment;
pub mod error;
mod facade;
pub mod playlist;
pub mod policy;
pub mod request;
pub mod stats;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use backend::{
    Completion, HttpFetcher, HttpPrefetchBackend, LoadSummary, NoopPrefetchBackend,
    PrefetchBackend, ResourceFetcher,
};
pub use config::{DEFAULT_USER_AGENT, DownloaderConfig, EngineConfig, HttpBackendConfig, create_client};
pub use controller::{ControllerEvent, ControllerSnapshot, PrefetchController, QueueLoad};
pub use environment::{
    EnvironmentMonitor, EnvironmentTracker, InterfaceType, PathSnapshot, PathStatus, classify_path,
};
pub use error::PrefetchError;
pub use facade::{DEFAULT_PREFETCH_MAX_COUNT, select_prefetch_candidates};
pub use playlist::{is_playlist_url, merge_query, resolve_child_urls};
pub use policy::{NetworkClass, PrefetchPolicy};
pub use request::PrefetchRequest;
pub use stats::{PrefetchStats, StatsSnapshot};
