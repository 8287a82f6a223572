// Prefetch backends: the capability that actually fetches and caches a URL.

mod http;
mod noop;

pub use http::{HttpFetcher, HttpPrefetchBackend, LoadSummary, ResourceFetcher};
pub use noop::NoopPrefetchBackend;

use tokio::sync::mpsc::WeakUnboundedSender;
use tracing::trace;

use crate::controller::ControllerEvent;
use crate::request::PrefetchRequest;

/// Performs the fetch of one URL on behalf of the controller.
///
/// Implementations must not block: `start` hands the work to the backend's
/// own executor and returns. The [`Completion`] passed to `start` must be
/// completed (or dropped) once the fetch ends, whether it succeeded, failed
/// or was cancelled.
pub trait PrefetchBackend: Send + Sync {
    fn start(&self, request: PrefetchRequest, completion: Completion);

    fn cancel(&self, request: &PrefetchRequest);

    fn cancel_all(&self);
}

/// One-shot completion signal for a started prefetch.
///
/// Dropping the token without calling [`Completion::complete`] signals
/// completion as well, so a backend that fails to start (or panics) still
/// frees the controller's slot.
#[derive(Debug)]
pub struct Completion {
    request: PrefetchRequest,
    ticket: u64,
    events: Option<WeakUnboundedSender<ControllerEvent>>,
}

impl Completion {
    pub(crate) fn new(
        request: PrefetchRequest,
        ticket: u64,
        events: WeakUnboundedSender<ControllerEvent>,
    ) -> Self {
        Self {
            request,
            ticket,
            events: Some(events),
        }
    }

    pub fn request(&self) -> &PrefetchRequest {
        &self.request
    }

    pub fn complete(mut self) {
        self.notify();
    }

    fn notify(&mut self) {
        let Some(events) = self.events.take() else {
            return;
        };
        // The controller may already be gone; nothing to free in that case.
        if let Some(events) = events.upgrade() {
            let _ = events.send(ControllerEvent::PrefetchFinished {
                request: self.request.clone(),
                ticket: self.ticket,
            });
        } else {
            trace!(url = %self.request, "Controller gone, completion discarded");
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.notify();
    }
}
