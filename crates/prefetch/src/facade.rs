// Playback-facing entry points: filter candidate URLs down to remote HLS
// playlists before they reach the controller.

use tracing::{debug, info, warn};
use url::Url;

use crate::controller::PrefetchController;
use crate::request::PrefetchRequest;

/// Default cap on playlists offered per `prefetch` call.
pub const DEFAULT_PREFETCH_MAX_COUNT: usize = 4;

/// Keeps remote HLS playlist URLs, in input order, up to `max_count`.
pub fn select_prefetch_candidates<I>(urls: I, max_count: usize) -> Vec<PrefetchRequest>
where
    I: IntoIterator<Item = Url>,
{
    urls.into_iter()
        .map(PrefetchRequest::new)
        .filter(PrefetchRequest::is_remote_playlist)
        .take(max_count)
        .collect()
}

impl PrefetchController {
    /// Prefetches HLS playlists (m3u8). URLs past `max_count` are ignored.
    pub fn prefetch<I>(&self, urls: I, max_count: usize)
    where
        I: IntoIterator<Item = Url>,
    {
        if max_count == 0 {
            warn!("Prefetch skipped (max_count is 0)");
            return;
        }
        let candidates = select_prefetch_candidates(urls, max_count);
        if candidates.is_empty() {
            debug!("Prefetch skipped (no HLS urls)");
            return;
        }
        info!(count = candidates.len(), max_count, "Prefetch request");
        self.enqueue(candidates);
    }

    /// Cancels all scheduled and in-flight prefetch work.
    pub fn cancel_prefetch(&self) {
        info!("Prefetch cancel all");
        self.cancel_all();
    }
}
