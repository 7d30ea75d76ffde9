// ── Runtime engine configuration ──
//
// These types describe *how* the engine paces itself: tick cadence, delete
// retry budget, settle pauses. They never touch disk. The config crate
// builds an `EngineConfig` and hands it in.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning for the tick driver and the applier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between periodic ticks.
    pub tick_interval_secs: u64,
    /// Upper bound of the random delay added to each periodic tick.
    pub tick_jitter_secs: u64,
    /// How long a delete keeps retrying an in-use entry.
    pub delete_timeout_secs: u64,
    /// Pause between delete attempts after a disconnect.
    pub delete_retry_pause_ms: u64,
    /// Pause between create and verification read-back.
    pub settle_delay_ms: u64,
    /// Interval of the disconnect-wait and connect-wait polling loops.
    pub poll_interval_ms: u64,
    /// Apply updates to connected profiles instead of holding them back.
    pub allow_updates_while_connected: bool,
    /// Service restarted when auto-trigger registration changes.
    pub restart_service: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 300,
            tick_jitter_secs: 30,
            delete_timeout_secs: 30,
            delete_retry_pause_ms: 1000,
            settle_delay_ms: 2000,
            poll_interval_ms: 250,
            allow_updates_while_connected: false,
            restart_service: "RasMan".into(),
        }
    }
}

impl EngineConfig {
    /// No pauses at all. Used by tests and the CLI simulator.
    pub fn immediate() -> Self {
        Self {
            delete_retry_pause_ms: 0,
            settle_delay_ms: 0,
            poll_interval_ms: 0,
            ..Self::default()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }

    pub fn delete_retry_pause(&self) -> Duration {
        Duration::from_millis(self.delete_retry_pause_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
