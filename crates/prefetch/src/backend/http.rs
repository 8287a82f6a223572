// HTTP Prefetch Backend: loads a playlist, follows nested playlists and warms
// an in-memory cache with the first segments of each media playlist.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use moka::future::Cache;
use parking_lot::Mutex;
use reqwest::Client;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace, warn};
use url::Url;

use super::{Completion, PrefetchBackend};
use crate::config::{HttpBackendConfig, create_client};
use crate::error::PrefetchError;
use crate::playlist::{is_playlist_url, resolve_child_urls};
use crate::request::PrefetchRequest;

/// Longest TTL the cache accepts (1000 years).
const MAX_CACHE_TTL: Duration = Duration::from_secs(1000 * 365 * 24 * 60 * 60);

/// Fetches the body of a single resource.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Bytes, PrefetchError>;
}

/// [`ResourceFetcher`] backed by a reqwest client.
pub struct HttpFetcher {
    client: Client,
    params: Vec<(String, String)>,
}

impl HttpFetcher {
    pub fn new(client: Client, params: Vec<(String, String)>) -> Self {
        Self { client, params }
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Bytes, PrefetchError> {
        let response = self
            .client
            .get(url.clone())
            .query(&self.params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let operation = if is_playlist_url(url) {
                "playlist fetch"
            } else {
                "segment fetch"
            };
            return Err(PrefetchError::http_status(status, url.as_str(), operation));
        }

        let bytes = response.bytes().await?;
        trace!(url = %url, bytes = bytes.len(), status = %status, "Fetched resource");
        Ok(bytes)
    }
}

/// What a single prefetch loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub playlists: usize,
    pub segments: usize,
    pub cache_hits: usize,
    pub failures: usize,
}

struct TaskEntry {
    id: u64,
    token: CancellationToken,
}

struct Inner {
    fetcher: Arc<dyn ResourceFetcher>,
    cache: Cache<Url, Bytes>,
    config: HttpBackendConfig,
    tasks: Mutex<HashMap<PrefetchRequest, TaskEntry>>,
    next_task_id: AtomicU64,
    runtime: Handle,
}

/// Prefetch backend that fetches over HTTP and caches bodies in memory.
#[derive(Clone)]
pub struct HttpPrefetchBackend {
    inner: Arc<Inner>,
}

impl HttpPrefetchBackend {
    /// Builds the backend with a reqwest client made from `config.downloader`.
    ///
    /// Must be called from within a tokio runtime; fetches run on it.
    pub fn new(config: HttpBackendConfig) -> Result<Self, PrefetchError> {
        let client = create_client(&config.downloader)?;
        let fetcher = HttpFetcher::new(client, config.downloader.params.clone());
        Self::with_fetcher(Arc::new(fetcher), config)
    }

    pub fn with_fetcher(
        fetcher: Arc<dyn ResourceFetcher>,
        config: HttpBackendConfig,
    ) -> Result<Self, PrefetchError> {
        if config.cache_ttl > MAX_CACHE_TTL {
            return Err(PrefetchError::configuration(format!(
                "cache_ttl of {:?} exceeds the maximum of {:?}",
                config.cache_ttl, MAX_CACHE_TTL
            )));
        }
        let runtime = Handle::try_current().map_err(|e| {
            PrefetchError::configuration(format!("HTTP prefetch backend needs a tokio runtime: {e}"))
        })?;
        let cache = Cache::builder()
            .max_capacity(config.cache_max_entries)
            .time_to_live(config.cache_ttl)
            .build();

        Ok(Self {
            inner: Arc::new(Inner {
                fetcher,
                cache,
                config,
                tasks: Mutex::new(HashMap::new()),
                next_task_id: AtomicU64::new(0),
                runtime,
            }),
        })
    }

    /// Cached body for `url`, if a prefetch stored one that has not expired.
    pub async fn cached(&self, url: &Url) -> Option<Bytes> {
        self.inner.cache.get(url).await
    }

    /// Number of fetches currently running.
    pub fn active_count(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Loads `root` and everything below it into the cache.
    pub async fn load(&self, root: &Url) -> Result<LoadSummary, PrefetchError> {
        self.inner.load(root).await
    }
}

impl Inner {
    async fn fetch_cached(&self, url: &Url) -> Result<(Bytes, bool), PrefetchError> {
        if let Some(body) = self.cache.get(url).await {
            trace!(url = %url, "Prefetch cache hit");
            return Ok((body, true));
        }
        let body = self.fetcher.fetch(url).await?;
        self.cache.insert(url.clone(), body.clone()).await;
        Ok((body, false))
    }

    async fn load(&self, root: &Url) -> Result<LoadSummary, PrefetchError> {
        let mut summary = LoadSummary::default();
        let mut playlists: VecDeque<(Url, usize)> = VecDeque::new();
        playlists.push_back((root.clone(), 0));

        while let Some((playlist_url, depth)) = playlists.pop_front() {
            let body = match self.fetch_cached(&playlist_url).await {
                Ok((body, hit)) => {
                    summary.cache_hits += usize::from(hit);
                    body
                }
                // The requested playlist itself is required; nested ones are best-effort.
                Err(e) if depth == 0 => return Err(e),
                Err(e) => {
                    warn!(url = %playlist_url, error = %e, "Nested playlist fetch failed");
                    summary.failures += 1;
                    continue;
                }
            };
            summary.playlists += 1;

            let text = match playlist_text(&playlist_url, &body) {
                Ok(text) => text,
                Err(e) if depth == 0 => return Err(e),
                Err(e) => {
                    warn!(url = %playlist_url, error = %e, "Skipping nested playlist");
                    summary.failures += 1;
                    continue;
                }
            };

            let (nested, mut segments): (Vec<Url>, Vec<Url>) =
                resolve_child_urls(text, &playlist_url)
                    .into_iter()
                    .partition(is_playlist_url);

            if depth < self.config.max_playlist_depth {
                playlists.extend(nested.into_iter().map(|url| (url, depth + 1)));
            } else if !nested.is_empty() {
                debug!(url = %playlist_url, skipped = nested.len(), "Playlist depth limit reached");
            }

            if self.config.max_segments_per_playlist > 0 {
                segments.truncate(self.config.max_segments_per_playlist);
            }

            let concurrency = self.config.segment_concurrency.max(1);
            let mut results = stream::iter(segments)
                .map(|segment_url| async move {
                    let res = self.fetch_cached(&segment_url).await;
                    (segment_url, res)
                })
                .buffer_unordered(concurrency);

            while let Some((segment_url, res)) = results.next().await {
                match res {
                    Ok((_, hit)) => {
                        summary.segments += 1;
                        summary.cache_hits += usize::from(hit);
                    }
                    Err(e) => {
                        debug!(url = %segment_url, error = %e, "Segment prefetch failed");
                        summary.failures += 1;
                    }
                }
            }
        }

        Ok(summary)
    }

    fn remove_task(&self, request: &PrefetchRequest, id: u64) {
        let mut tasks = self.tasks.lock();
        if tasks.get(request).is_some_and(|entry| entry.id == id) {
            tasks.remove(request);
        }
    }
}

/// Playlist body as text, provided it is UTF-8 and starts with `#EXTM3U`.
fn playlist_text<'a>(url: &Url, body: &'a [u8]) -> Result<&'a str, PrefetchError> {
    let text = std::str::from_utf8(body)
        .map_err(|e| PrefetchError::playlist(format!("{url} is not UTF-8: {e}")))?;
    if !text.trim_start().starts_with("#EXTM3U") {
        return Err(PrefetchError::playlist(format!(
            "{url} is missing the #EXTM3U header"
        )));
    }
    Ok(text)
}

impl PrefetchBackend for HttpPrefetchBackend {
    fn start(&self, request: PrefetchRequest, completion: Completion) {
        let id = self.inner.next_task_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        if let Some(previous) = self.inner.tasks.lock().insert(
            request.clone(),
            TaskEntry {
                id,
                token: token.clone(),
            },
        ) {
            debug!(url = %request, "Replacing running prefetch");
            previous.token.cancel();
        }

        debug!(url = %request, "HLS prefetch start");
        let inner = Arc::clone(&self.inner);
        let span = info_span!("prefetch", url = %request);
        self.inner.runtime.spawn(
            async move {
                let root = request.url().clone();
                let outcome = tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(PrefetchError::Cancelled),
                    res = inner.load(&root) => res,
                };

                match outcome {
                    Ok(summary) => debug!(?summary, "HLS prefetch finished"),
                    Err(PrefetchError::Cancelled) => debug!("HLS prefetch cancelled"),
                    Err(e) => {
                        warn!(error = %e, retryable = e.is_retryable(), "HLS prefetch failed")
                    }
                }

                inner.remove_task(&request, id);
                completion.complete();
            }
            .instrument(span),
        );
    }

    fn cancel(&self, request: &PrefetchRequest) {
        if let Some(entry) = self.inner.tasks.lock().remove(request) {
            debug!(url = %request, "HLS prefetch cancel");
            entry.token.cancel();
        }
    }

    fn cancel_all(&self) {
        let tasks: Vec<TaskEntry> = self.inner.tasks.lock().drain().map(|(_, e)| e).collect();
        info!(count = tasks.len(), "HLS prefetch cancel all");
        for entry in tasks {
            entry.token.cancel();
        }
    }
}
