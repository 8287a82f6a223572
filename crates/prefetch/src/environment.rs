// Network/Power Observer: turns raw reachability and power readings into
// network-class and low-power transitions for the controller.
//
// Platform glue pushes readings from whatever thread it gets them on; a single
// monitor task de-duplicates them and forwards changes in arrival order.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::controller::PrefetchController;
use crate::policy::NetworkClass;

/// Reachability of the current network path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    Satisfied,
    Unsatisfied,
    /// Reachable only after a connection is brought up (e.g. VPN on demand).
    RequiresConnection,
}

/// Interface kinds a path can run over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceType {
    Wifi,
    Cellular,
    WiredEthernet,
    Loopback,
    Other,
}

/// One reachability reading as delivered by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSnapshot {
    pub status: PathStatus,
    pub interfaces: Vec<InterfaceType>,
    /// Data-saver / low-data mode
    pub is_constrained: bool,
    /// Metered connection (cellular, personal hotspot)
    pub is_expensive: bool,
}

impl PathSnapshot {
    pub fn satisfied(interfaces: Vec<InterfaceType>) -> Self {
        Self {
            status: PathStatus::Satisfied,
            interfaces,
            is_constrained: false,
            is_expensive: false,
        }
    }

    pub fn unsatisfied() -> Self {
        Self {
            status: PathStatus::Unsatisfied,
            interfaces: Vec::new(),
            is_constrained: false,
            is_expensive: false,
        }
    }

    pub fn uses_interface(&self, interface: InterfaceType) -> bool {
        self.interfaces.contains(&interface)
    }
}

/// Classifies a path, first matching rule wins:
/// unsatisfied, constrained, wifi, cellular or expensive, anything else.
pub fn classify_path(path: &PathSnapshot) -> NetworkClass {
    if path.status != PathStatus::Satisfied {
        NetworkClass::Unknown
    } else if path.is_constrained {
        NetworkClass::Constrained
    } else if path.uses_interface(InterfaceType::Wifi) {
        NetworkClass::Wifi
    } else if path.uses_interface(InterfaceType::Cellular) || path.is_expensive {
        NetworkClass::Cellular
    } else {
        NetworkClass::Other
    }
}

/// Remembers the last reported environment and only reports changes.
#[derive(Debug, Clone)]
pub struct EnvironmentTracker {
    network_class: NetworkClass,
    low_power_mode_enabled: bool,
}

impl EnvironmentTracker {
    pub fn new(network_class: NetworkClass, low_power_mode_enabled: bool) -> Self {
        Self {
            network_class,
            low_power_mode_enabled,
        }
    }

    pub fn network_class(&self) -> NetworkClass {
        self.network_class
    }

    pub fn low_power_mode_enabled(&self) -> bool {
        self.low_power_mode_enabled
    }

    /// The new class if the path changes it.
    pub fn observe_path(&mut self, path: &PathSnapshot) -> Option<NetworkClass> {
        let class = classify_path(path);
        if class == self.network_class {
            return None;
        }
        self.network_class = class;
        Some(class)
    }

    /// The new power state if it differs from the last one.
    pub fn observe_low_power_mode(&mut self, enabled: bool) -> Option<bool> {
        if enabled == self.low_power_mode_enabled {
            return None;
        }
        self.low_power_mode_enabled = enabled;
        Some(enabled)
    }
}

#[derive(Debug)]
enum EnvironmentSignal {
    Path(PathSnapshot),
    LowPowerMode(bool),
}

/// Handle used by platform glue to report readings.
#[derive(Debug, Clone)]
pub struct EnvironmentMonitor {
    signals: mpsc::UnboundedSender<EnvironmentSignal>,
    token: CancellationToken,
}

impl EnvironmentMonitor {
    /// Spawns the monitor task. `network_class` and `low_power_mode_enabled`
    /// must match what the controller was started with.
    pub fn spawn(
        controller: PrefetchController,
        network_class: NetworkClass,
        low_power_mode_enabled: bool,
    ) -> (Self, JoinHandle<()>) {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let tracker = EnvironmentTracker::new(network_class, low_power_mode_enabled);

        debug!("Prefetch network monitor start");
        let handle = tokio::spawn(run(tracker, controller, signals_rx, token.clone()));

        (
            Self {
                signals: signals_tx,
                token,
            },
            handle,
        )
    }

    fn send(&self, signal: EnvironmentSignal) {
        if self.signals.send(signal).is_err() {
            warn!("Prefetch network monitor stopped; reading dropped");
        }
    }

    pub fn path_updated(&self, path: PathSnapshot) {
        self.send(EnvironmentSignal::Path(path));
    }

    pub fn low_power_mode_updated(&self, enabled: bool) {
        self.send(EnvironmentSignal::LowPowerMode(enabled));
    }

    pub fn is_running(&self) -> bool {
        !self.signals.is_closed()
    }

    pub fn stop(&self) {
        self.token.cancel();
    }
}

async fn run(
    mut tracker: EnvironmentTracker,
    controller: PrefetchController,
    mut signals_rx: mpsc::UnboundedReceiver<EnvironmentSignal>,
    token: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            signal = signals_rx.recv() => match signal {
                Some(signal) => signal,
                None => break,
            },
        };

        match signal {
            EnvironmentSignal::Path(path) => match tracker.observe_path(&path) {
                Some(class) => {
                    info!(class = %class, "Prefetch network class");
                    controller.network_class_changed(class);
                }
                None => trace!(?path, "Path update without class change"),
            },
            EnvironmentSignal::LowPowerMode(enabled) => {
                if let Some(enabled) = tracker.observe_low_power_mode(enabled) {
                    debug!(enabled, "Prefetch low power mode changed");
                    controller.low_power_mode_changed(enabled);
                }
            }
        }
    }
    signals_rx.close();
    debug!("Prefetch network monitor stopped");
}
