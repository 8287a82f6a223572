use tracing::trace;

use super::{Completion, PrefetchBackend};
use crate::request::PrefetchRequest;

/// Backend that completes every request immediately without fetching anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPrefetchBackend;

impl PrefetchBackend for NoopPrefetchBackend {
    fn start(&self, request: PrefetchRequest, completion: Completion) {
        trace!(url = %request, "Noop prefetch");
        completion.complete();
    }

    fn cancel(&self, _request: &PrefetchRequest) {}

    fn cancel_all(&self) {}
}
