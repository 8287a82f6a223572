// Prefetch Controller: a cloneable handle in front of a single worker task that
// owns all scheduling state.

mod events;
mod scheduler;

pub use events::{ControllerEvent, ControllerSnapshot, QueueLoad};

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::PrefetchBackend;
use crate::error::PrefetchError;
use crate::policy::{NetworkClass, PrefetchPolicy};
use crate::request::PrefetchRequest;
use crate::stats::PrefetchStats;
use scheduler::PrefetchScheduler;

/// Handle to the prefetch controller.
///
/// Every method only queues an event for the worker and returns; none of
/// them wait for fetches. Clones share the same worker.
#[derive(Debug, Clone)]
pub struct PrefetchController {
    events: mpsc::UnboundedSender<ControllerEvent>,
    load_rx: watch::Receiver<QueueLoad>,
    stats: Arc<PrefetchStats>,
    token: CancellationToken,
}

impl PrefetchController {
    /// Spawns the controller worker with an unknown network and low-power mode off.
    pub fn spawn(
        backend: Arc<dyn PrefetchBackend>,
        policy: PrefetchPolicy,
    ) -> (Self, JoinHandle<()>) {
        Self::spawn_with_environment(backend, policy, NetworkClass::Unknown, false)
    }

    /// Spawns the controller worker with a known starting environment.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_with_environment(
        backend: Arc<dyn PrefetchBackend>,
        policy: PrefetchPolicy,
        network_class: NetworkClass,
        low_power_mode_enabled: bool,
    ) -> (Self, JoinHandle<()>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (load_tx, load_rx) = watch::channel(QueueLoad::default());
        let stats = Arc::new(PrefetchStats::new());
        let token = CancellationToken::new();

        debug!(class = %network_class, low_power_mode_enabled, "Prefetch controller init");
        let scheduler = PrefetchScheduler::new(
            backend,
            events_tx.downgrade(),
            load_tx,
            Arc::clone(&stats),
            policy,
            network_class,
            low_power_mode_enabled,
        );

        let handle = tokio::spawn(run(scheduler, events_rx, token.clone()));

        (
            Self {
                events: events_tx,
                load_rx,
                stats,
                token,
            },
            handle,
        )
    }

    fn send(&self, event: ControllerEvent) {
        if self.events.send(event).is_err() {
            warn!("Prefetch controller stopped; event dropped");
        }
    }

    /// Offers URLs for prefetching. Duplicates and URLs beyond the current
    /// budget are dropped.
    pub fn enqueue<I>(&self, requests: I)
    where
        I: IntoIterator<Item = PrefetchRequest>,
    {
        let requests: Vec<PrefetchRequest> = requests.into_iter().collect();
        if requests.is_empty() {
            return;
        }
        debug!(count = requests.len(), "Prefetch enqueue");
        self.send(ControllerEvent::Enqueue(requests));
    }

    /// Drops all queued work and cancels everything in flight.
    pub fn cancel_all(&self) {
        self.send(ControllerEvent::CancelAll);
    }

    pub fn set_policy(&self, policy: PrefetchPolicy) {
        self.send(ControllerEvent::PolicyChanged(policy));
    }

    pub fn network_class_changed(&self, class: NetworkClass) {
        self.send(ControllerEvent::NetworkChanged(class));
    }

    pub fn low_power_mode_changed(&self, enabled: bool) {
        self.send(ControllerEvent::PowerChanged(enabled));
    }

    /// State after every event sent before this call has been applied.
    pub async fn snapshot(&self) -> Result<ControllerSnapshot, PrefetchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.events
            .send(ControllerEvent::Snapshot(reply_tx))
            .map_err(|_| PrefetchError::ControllerClosed)?;
        reply_rx.await.map_err(|_| PrefetchError::ControllerClosed)
    }

    /// Pending/in-flight counts as of the last processed event.
    pub fn load(&self) -> QueueLoad {
        *self.load_rx.borrow()
    }

    /// Watch channel that changes whenever pending/in-flight counts change.
    pub fn subscribe_load(&self) -> watch::Receiver<QueueLoad> {
        self.load_rx.clone()
    }

    /// Resolves once every event sent so far has been applied and nothing is
    /// pending or in flight.
    pub async fn wait_idle(&self) -> Result<(), PrefetchError> {
        if self.snapshot().await?.is_idle() {
            return Ok(());
        }
        let mut load_rx = self.load_rx.clone();
        load_rx
            .wait_for(QueueLoad::is_idle)
            .await
            .map(|_| ())
            .map_err(|_| PrefetchError::ControllerClosed)
    }

    pub fn stats(&self) -> &PrefetchStats {
        &self.stats
    }

    /// Stops the worker. In-flight work is cancelled on the way out.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.events.is_closed()
    }
}

async fn run(
    mut scheduler: PrefetchScheduler,
    mut events_rx: mpsc::UnboundedReceiver<ControllerEvent>,
    token: CancellationToken,
) {
    info!("Prefetch controller started.");
    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                info!("Cancellation token received. Prefetch controller shutting down.");
                break;
            }

            maybe_event = events_rx.recv() => {
                match maybe_event {
                    Some(event) => scheduler.handle(event),
                    None => {
                        debug!("All controller handles dropped.");
                        break;
                    }
                }
            }
        }
    }
    events_rx.close();
    scheduler.cancel_everything();
    info!("Prefetch controller stopped.");
}
