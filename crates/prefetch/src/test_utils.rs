// Helpers shared by unit and integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{Completion, PrefetchBackend};
use crate::request::PrefetchRequest;

/// Initialize tracing for tests with appropriate settings
#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer() // Write to test output
        .try_init();
}

/// `count` distinct playlist requests, in a stable order.
pub fn requests(count: usize) -> Vec<PrefetchRequest> {
    (0..count)
        .map(|i| request(&format!("https://cdn.example.com/stream-{i}/index.m3u8")))
        .collect()
}

pub fn request(url: &str) -> PrefetchRequest {
    PrefetchRequest::parse(url).expect("test URL must be valid")
}

#[derive(Debug, Default)]
struct Recorded {
    started: Vec<PrefetchRequest>,
    active: Vec<Completion>,
    cancelled: Vec<PrefetchRequest>,
    cancel_all_calls: usize,
}

/// Backend that records calls and holds completions until the test releases them.
///
/// Cancelled work is completed right away, like a backend that calls back on cancel.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    inner: Mutex<Recorded>,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn started(&self) -> Vec<PrefetchRequest> {
        self.inner.lock().started.clone()
    }

    /// Requests started and not yet finished or cancelled.
    pub fn active(&self) -> Vec<PrefetchRequest> {
        self.inner
            .lock()
            .active
            .iter()
            .map(|c| c.request().clone())
            .collect()
    }

    pub fn cancelled(&self) -> Vec<PrefetchRequest> {
        self.inner.lock().cancelled.clone()
    }

    pub fn cancel_all_calls(&self) -> usize {
        self.inner.lock().cancel_all_calls
    }

    /// Completes the oldest active fetch of `request`. Returns false if none is active.
    pub fn finish(&self, request: &PrefetchRequest) -> bool {
        let completion = {
            let mut inner = self.inner.lock();
            let Some(pos) = inner.active.iter().position(|c| c.request() == request) else {
                return false;
            };
            inner.active.remove(pos)
        };
        completion.complete();
        true
    }

    /// Completes every active fetch. Returns how many were completed.
    pub fn finish_all(&self) -> usize {
        let completions: Vec<Completion> = std::mem::take(&mut self.inner.lock().active);
        let count = completions.len();
        completions.into_iter().for_each(Completion::complete);
        count
    }

    /// Counts per request of how often it was started.
    pub fn start_counts(&self) -> HashMap<PrefetchRequest, usize> {
        let mut counts = HashMap::new();
        for request in self.inner.lock().started.iter() {
            *counts.entry(request.clone()).or_insert(0) += 1;
        }
        counts
    }
}

impl PrefetchBackend for RecordingBackend {
    fn start(&self, request: PrefetchRequest, completion: Completion) {
        let mut inner = self.inner.lock();
        inner.started.push(request);
        inner.active.push(completion);
    }

    fn cancel(&self, request: &PrefetchRequest) {
        let cancelled: Vec<Completion> = {
            let mut inner = self.inner.lock();
            inner.cancelled.push(request.clone());
            let (cancelled, kept) = std::mem::take(&mut inner.active)
                .into_iter()
                .partition(|c| c.request() == request);
            inner.active = kept;
            cancelled
        };
        drop(cancelled);
    }

    fn cancel_all(&self) {
        let cancelled = {
            let mut inner = self.inner.lock();
            inner.cancel_all_calls += 1;
            let active = std::mem::take(&mut inner.active);
            inner
                .cancelled
                .extend(active.iter().map(|c| c.request().clone()));
            active
        };
        drop(cancelled);
    }
}
