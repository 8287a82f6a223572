// Prefetch policy: maps the current network class to item and concurrency budgets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Coarse classification of the current connectivity.
///
/// `Unknown` is the safe default whenever the path is unsatisfied or cannot be
/// classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum NetworkClass {
    Wifi,
    Cellular,
    Constrained,
    Other,
    #[default]
    Unknown,
}

impl NetworkClass {
    pub const ALL: [NetworkClass; 5] = [
        NetworkClass::Wifi,
        NetworkClass::Cellular,
        NetworkClass::Constrained,
        NetworkClass::Other,
        NetworkClass::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkClass::Wifi => "wifi",
            NetworkClass::Cellular => "cellular",
            NetworkClass::Constrained => "constrained",
            NetworkClass::Other => "other",
            NetworkClass::Unknown => "unknown",
        }
    }
}

impl FromStr for NetworkClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NetworkClass::ALL
            .into_iter()
            .find(|class| class.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown network class `{s}`"))
    }
}

impl fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits applied by the prefetch controller.
///
/// A class missing from `max_items_by_network_class` has a budget of zero,
/// which disables prefetching on that class entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchPolicy {
    /// Upper bound on concurrent backend fetches, before the per-class cap.
    pub max_concurrent: usize,
    /// Total (pending + in-flight) item budget per network class.
    #[serde(with = "class_budgets")]
    pub max_items_by_network_class: BTreeMap<NetworkClass, usize>,
    /// Global kill switch: when false, low-power mode suspends all prefetching.
    pub allow_in_low_power_mode: bool,
}

impl Default for PrefetchPolicy {
    fn default() -> Self {
        let mut max_items = BTreeMap::new();
        max_items.insert(NetworkClass::Wifi, 4);
        max_items.insert(NetworkClass::Cellular, 1);
        max_items.insert(NetworkClass::Constrained, 1);
        max_items.insert(NetworkClass::Other, 1);
        max_items.insert(NetworkClass::Unknown, 1);

        Self {
            max_concurrent: 2,
            max_items_by_network_class: max_items,
            allow_in_low_power_mode: false,
        }
    }
}

impl PrefetchPolicy {
    /// A policy with the given concurrency and no per-class budgets yet.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            max_items_by_network_class: BTreeMap::new(),
            allow_in_low_power_mode: false,
        }
    }

    pub fn with_max_items(mut self, class: NetworkClass, max_items: usize) -> Self {
        self.max_items_by_network_class.insert(class, max_items);
        self
    }

    pub fn with_allow_in_low_power_mode(mut self, allow: bool) -> Self {
        self.allow_in_low_power_mode = allow;
        self
    }

    /// Total item budget for the class.
    pub fn max_items(&self, class: NetworkClass) -> usize {
        self.max_items_by_network_class
            .get(&class)
            .copied()
            .unwrap_or(0)
    }

    /// Concurrency for the class; never exceeds the class item budget.
    pub fn max_concurrent(&self, class: NetworkClass) -> usize {
        self.max_concurrent.min(self.max_items(class))
    }

    /// Whether prefetching may run under the given power state.
    pub fn allows(&self, low_power_mode_enabled: bool) -> bool {
        !low_power_mode_enabled || self.allow_in_low_power_mode
    }
}

// Class budgets are keyed by class name so any self-describing format can carry them.
mod class_budgets {
    use super::NetworkClass;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S>(map: &BTreeMap<NetworkClass, usize>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        map.iter()
            .map(|(class, max)| (class.as_str(), *max))
            .collect::<BTreeMap<_, _>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<NetworkClass, usize>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, usize>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(name, max)| {
                name.parse::<NetworkClass>()
                    .map(|class| (class, max))
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}
