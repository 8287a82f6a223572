// Prefetch Scheduler: owns the pending queue and the in-flight set, applies the
// policy and drains queued work into the backend.
//
// Every method runs on the controller worker, one event at a time, so nothing
// here needs locking. The backend is only ever started from `drain`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::backend::{Completion, PrefetchBackend};
use crate::controller::events::{ControllerEvent, ControllerSnapshot, QueueLoad};
use crate::policy::{NetworkClass, PrefetchPolicy};
use crate::request::PrefetchRequest;
use crate::stats::PrefetchStats;

pub(crate) struct PrefetchScheduler {
    backend: Arc<dyn PrefetchBackend>,
    /// Handed to every completion; weak so in-flight work never keeps the worker alive
    events: WeakUnboundedSender<ControllerEvent>,
    load_tx: watch::Sender<QueueLoad>,
    stats: Arc<PrefetchStats>,

    policy: PrefetchPolicy,
    network_class: NetworkClass,
    low_power_mode_enabled: bool,

    pending: VecDeque<PrefetchRequest>,
    pending_set: HashSet<PrefetchRequest>,
    /// In-flight URL -> ticket of the start that owns the slot
    in_flight: HashMap<PrefetchRequest, u64>,
    next_ticket: u64,
}

impl PrefetchScheduler {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        backend: Arc<dyn PrefetchBackend>,
        events: WeakUnboundedSender<ControllerEvent>,
        load_tx: watch::Sender<QueueLoad>,
        stats: Arc<PrefetchStats>,
        policy: PrefetchPolicy,
        network_class: NetworkClass,
        low_power_mode_enabled: bool,
    ) -> Self {
        Self {
            backend,
            events,
            load_tx,
            stats,
            policy,
            network_class,
            low_power_mode_enabled,
            pending: VecDeque::new(),
            pending_set: HashSet::new(),
            in_flight: HashMap::new(),
            next_ticket: 0,
        }
    }

    /// Applies one event and publishes the resulting load.
    pub(crate) fn handle(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Enqueue(requests) => self.enqueue(requests),
            ControllerEvent::CancelAll => {
                info!("Prefetch cancel all");
                self.cancel_everything();
            }
            ControllerEvent::PolicyChanged(policy) => self.set_policy(policy),
            ControllerEvent::NetworkChanged(class) => self.set_network_class(class),
            ControllerEvent::PowerChanged(enabled) => self.set_low_power_mode(enabled),
            ControllerEvent::PrefetchFinished { request, ticket } => self.finish(request, ticket),
            ControllerEvent::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
        self.publish_load();
    }

    fn is_allowed(&self) -> bool {
        self.policy.allows(self.low_power_mode_enabled)
    }

    fn max_total_items(&self) -> usize {
        self.policy.max_items(self.network_class)
    }

    /// Admits new URLs, oldest first, until the class budget is used up.
    pub(crate) fn enqueue(&mut self, requests: Vec<PrefetchRequest>) {
        if requests.is_empty() {
            return;
        }
        if !self.is_allowed() {
            debug!(count = requests.len(), "Prefetch enqueue skipped (not allowed)");
            PrefetchStats::add(&self.stats.dropped, requests.len());
            return;
        }
        let allowed_total = self.max_total_items();
        if allowed_total == 0 {
            debug!(count = requests.len(), class = %self.network_class, "Prefetch enqueue skipped (limit 0)");
            PrefetchStats::add(&self.stats.dropped, requests.len());
            return;
        }

        let offered = requests.len();
        let mut admitted = 0;
        let mut duplicates = 0;
        for request in requests {
            if self.in_flight.contains_key(&request) || self.pending_set.contains(&request) {
                duplicates += 1;
                continue;
            }
            if self.pending.len() + self.in_flight.len() >= allowed_total {
                break;
            }
            self.pending_set.insert(request.clone());
            self.pending.push_back(request);
            admitted += 1;
        }
        let dropped = offered - admitted - duplicates;

        PrefetchStats::add(&self.stats.admitted, admitted);
        PrefetchStats::add(&self.stats.duplicates, duplicates);
        PrefetchStats::add(&self.stats.dropped, dropped);
        debug!(
            admitted,
            duplicates,
            dropped,
            limit = allowed_total,
            "Prefetch enqueue"
        );

        self.drain();
    }

    /// Starts queued work while respecting the concurrency cap.
    ///
    /// Calling this when nothing is eligible is a no-op.
    fn drain(&mut self) {
        if !self.is_allowed() {
            return;
        }
        let max_concurrent = self.policy.max_concurrent(self.network_class);

        while self.in_flight.len() < max_concurrent {
            let Some(request) = self.pending.pop_front() else {
                break;
            };
            self.pending_set.remove(&request);

            let ticket = self.next_ticket;
            self.next_ticket += 1;
            self.in_flight.insert(request.clone(), ticket);
            PrefetchStats::add(&self.stats.started, 1);

            debug!(url = %request, ticket, "Prefetch start");
            let completion = Completion::new(request.clone(), ticket, self.events.clone());
            self.backend.start(request, completion);
        }
    }

    /// Frees the slot owned by `ticket` and continues draining.
    fn finish(&mut self, request: PrefetchRequest, ticket: u64) {
        if self.in_flight.get(&request) == Some(&ticket) {
            self.in_flight.remove(&request);
            PrefetchStats::add(&self.stats.finished, 1);
            debug!(url = %request, ticket, "Prefetch finished");
        } else {
            // Cancelled earlier; the slot was already released.
            PrefetchStats::add(&self.stats.stale_completions, 1);
            trace!(url = %request, ticket, "Ignoring stale prefetch completion");
        }
        self.drain();
    }

    fn set_policy(&mut self, policy: PrefetchPolicy) {
        if policy == self.policy {
            debug!("Prefetch policy unchanged");
            return;
        }
        info!(?policy, "Prefetch policy updated");
        self.policy = policy;
        self.apply_policy();
    }

    fn set_network_class(&mut self, class: NetworkClass) {
        if class == self.network_class {
            return;
        }
        info!(from = %self.network_class, to = %class, "Prefetch network class changed");
        self.network_class = class;
        self.apply_policy();
    }

    fn set_low_power_mode(&mut self, enabled: bool) {
        if enabled == self.low_power_mode_enabled {
            return;
        }
        info!(enabled, "Prefetch low power mode changed");
        self.low_power_mode_enabled = enabled;
        self.apply_policy();
    }

    /// Re-evaluates current work against the policy and environment.
    fn apply_policy(&mut self) {
        if !self.is_allowed() {
            debug!("Prefetch apply policy: not allowed");
            self.cancel_everything();
            return;
        }

        let allowed_total = self.max_total_items();
        if allowed_total == 0 {
            debug!(class = %self.network_class, "Prefetch apply policy: limit 0");
            self.cancel_everything();
            return;
        }

        if self.in_flight.len() > allowed_total {
            info!(
                in_flight = self.in_flight.len(),
                limit = allowed_total,
                "Prefetch apply policy: in-flight exceeds limit"
            );
            self.cancel_everything();
            return;
        }

        let allowed_pending = allowed_total - self.in_flight.len();
        if self.pending.len() > allowed_pending {
            let removed = self.pending.len() - allowed_pending;
            debug!(removed, "Prefetch apply policy: trim pending");
            for request in self.pending.drain(allowed_pending..) {
                self.pending_set.remove(&request);
            }
            PrefetchStats::add(&self.stats.trimmed, removed);
        }

        self.drain();
    }

    /// Clears pending work and cancels everything in flight.
    ///
    /// Slots are considered free immediately; late completions for the
    /// cancelled tickets are ignored.
    pub(crate) fn cancel_everything(&mut self) {
        PrefetchStats::add(&self.stats.trimmed, self.pending.len());
        self.pending.clear();
        self.pending_set.clear();

        if !self.in_flight.is_empty() {
            PrefetchStats::add(&self.stats.cancelled, self.in_flight.len());
            self.in_flight.clear();
            self.backend.cancel_all();
        }
    }

    pub(crate) fn snapshot(&self) -> ControllerSnapshot {
        let mut in_flight: Vec<(&PrefetchRequest, u64)> = self
            .in_flight
            .iter()
            .map(|(request, ticket)| (request, *ticket))
            .collect();
        in_flight.sort_by_key(|(_, ticket)| *ticket);

        ControllerSnapshot {
            pending: self.pending.iter().cloned().collect(),
            in_flight: in_flight
                .into_iter()
                .map(|(request, _)| request.clone())
                .collect(),
            network_class: self.network_class,
            low_power_mode_enabled: self.low_power_mode_enabled,
            policy: self.policy.clone(),
            stats: self.stats.snapshot(),
        }
    }

    fn publish_load(&self) {
        let load = QueueLoad {
            pending: self.pending.len(),
            in_flight: self.in_flight.len(),
        };
        self.load_tx.send_if_modified(|current| {
            if *current == load {
                false
            } else {
                *current = load;
                true
            }
        });
    }
}
