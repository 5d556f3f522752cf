//! Environment snapshot types — shared between the scheduler engine and the
//! host adapters that observe the platform.
//!
//! The scheduler never probes hardware. The host publishes a fresh
//! [`EnvironmentSnapshot`] whenever conditions change (or at least often
//! enough for its taste); the engine reads whichever snapshot is current at
//! the start of each wake cycle.

use serde::{Deserialize, Serialize};

/// Connectivity classification as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkClass {
    /// No usable network connection.
    Offline,
    /// Connected over a metered link (cellular, tethered, capped).
    Metered,
    /// Connected over an unmetered link (typically Wi-Fi or ethernet).
    Unmetered,
}

impl std::fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NetworkClass::Offline => "offline",
            NetworkClass::Metered => "metered",
            NetworkClass::Unmetered => "unmetered",
        };
        write!(f, "{s}")
    }
}

/// Point-in-time view of the execution environment.
///
/// Fields the host cannot report are expressed as `None` and the matching
/// constraint is treated as vacuously satisfied — a host without an idle
/// detector must not starve idle-constrained work forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    /// Current connectivity class.
    pub network: NetworkClass,
    /// True when the battery is below the host's low-battery threshold.
    pub battery_low: bool,
    /// True while connected to external power.
    pub charging: bool,
    /// Whether the device is idle; `None` when the host has no idle signal.
    pub idle: Option<bool>,
}

impl Default for EnvironmentSnapshot {
    /// Conservative default used before the host publishes anything:
    /// offline and unplugged, so only unconstrained work is admissible.
    fn default() -> Self {
        Self {
            network: NetworkClass::Offline,
            battery_low: false,
            charging: false,
            idle: None,
        }
    }
}
