use tokio::sync::oneshot;

use crate::policy::{NetworkClass, PrefetchPolicy};
use crate::request::PrefetchRequest;
use crate::stats::StatsSnapshot;

/// Everything that can change controller state, processed one at a time by
/// the controller worker in arrival order.
#[derive(Debug)]
pub enum ControllerEvent {
    Enqueue(Vec<PrefetchRequest>),
    CancelAll,
    PolicyChanged(PrefetchPolicy),
    NetworkChanged(NetworkClass),
    PowerChanged(bool),
    /// The backend finished (or gave up on) the fetch started with `ticket`.
    PrefetchFinished {
        request: PrefetchRequest,
        ticket: u64,
    },
    Snapshot(oneshot::Sender<ControllerSnapshot>),
}

/// Pending and in-flight counts, published after every event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueLoad {
    pub pending: usize,
    pub in_flight: usize,
}

impl QueueLoad {
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.in_flight == 0
    }
}

/// Consistent view of the controller between two events.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    /// Queued URLs, oldest first
    pub pending: Vec<PrefetchRequest>,
    /// URLs being fetched, in start order
    pub in_flight: Vec<PrefetchRequest>,
    pub network_class: NetworkClass,
    pub low_power_mode_enabled: bool,
    pub policy: PrefetchPolicy,
    pub stats: StatsSnapshot,
}

impl ControllerSnapshot {
    pub fn load(&self) -> QueueLoad {
        QueueLoad {
            pending: self.pending.len(),
            in_flight: self.in_flight.len(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.load().is_idle()
    }
}
