//! Gate and control-plane configuration subsections.
//!
//! The `gate.*` parameters tune the fast path (mesh port, session TTL,
//! number of stats shards); `control.*` tunes the housekeeping tasks and
//! the rejection monitor.
//!
//! Every tunable is optional in the file so that layered files only
//! override what they actually set. Accessors resolve the defaults.

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_MESH_PORT;

/// Default session inactivity TTL in seconds.
const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Default expired-session sweep period in seconds.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default stats report period in seconds.
const DEFAULT_STATS_INTERVAL_SECS: u64 = 30;

/// Default MAC failure ratio that raises an alert.
const DEFAULT_MAX_MAC_FAILURE_RATE: f64 = 0.05;

/// Default replays per interval that raise an alert.
const DEFAULT_REPLAY_ALERT_THRESHOLD: u64 = 1;

/// Default expired-session rejections per interval that raise an alert.
const DEFAULT_EXPIRED_ALERT_THRESHOLD: u64 = 10;

// ============================================================================
// Fast Path
// ============================================================================

/// Fast-path authenticator (`gate.*`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Well-known UDP port carrying mesh traffic (`gate.mesh_port`). Defaults to 10809.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_port: Option<u16>,
    /// Session inactivity TTL in seconds (`gate.session_ttl_secs`). Defaults to 3600.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_ttl_secs: Option<u64>,
    /// Stats shards / processing contexts; 0 = available parallelism (`gate.shards`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shards: Option<usize>,
    /// Soft limit on installed sessions (`gate.max_sessions`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<usize>,
}

impl GateConfig {
    /// Get the mesh port, using default if not configured.
    pub fn mesh_port(&self) -> u16 {
        self.mesh_port.unwrap_or(DEFAULT_MESH_PORT)
    }

    /// Get the session TTL, using default if not configured.
    pub fn session_ttl_secs(&self) -> u64 {
        self.session_ttl_secs.unwrap_or(DEFAULT_SESSION_TTL_SECS)
    }

    /// Resolve the shard count, substituting available parallelism for 0.
    pub fn shard_count(&self) -> usize {
        match self.shards {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    /// Override the fields that `other` sets.
    pub(super) fn merge(&mut self, other: GateConfig) {
        if other.mesh_port.is_some() {
            self.mesh_port = other.mesh_port;
        }
        if other.session_ttl_secs.is_some() {
            self.session_ttl_secs = other.session_ttl_secs;
        }
        if other.shards.is_some() {
            self.shards = other.shards;
        }
        if other.max_sessions.is_some() {
            self.max_sessions = other.max_sessions;
        }
    }
}

// ============================================================================
// Control Plane
// ============================================================================

/// Rejection monitor thresholds (`control.monitor.*`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// MAC failure ratio per interval that raises an alert
    /// (`control.monitor.max_mac_failure_rate`). Defaults to 0.05.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_mac_failure_rate: Option<f64>,
    /// Replays per interval that raise an alert; 0 disables
    /// (`control.monitor.replay_alert_threshold`). Defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_alert_threshold: Option<u64>,
    /// Expired-session rejections per interval that raise an alert; 0 disables
    /// (`control.monitor.expired_alert_threshold`). Defaults to 10.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_alert_threshold: Option<u64>,
}

impl MonitorConfig {
    pub fn max_mac_failure_rate(&self) -> f64 {
        self.max_mac_failure_rate.unwrap_or(DEFAULT_MAX_MAC_FAILURE_RATE)
    }

    pub fn replay_alert_threshold(&self) -> u64 {
        self.replay_alert_threshold.unwrap_or(DEFAULT_REPLAY_ALERT_THRESHOLD)
    }

    pub fn expired_alert_threshold(&self) -> u64 {
        self.expired_alert_threshold.unwrap_or(DEFAULT_EXPIRED_ALERT_THRESHOLD)
    }

    fn merge(&mut self, other: MonitorConfig) {
        if other.max_mac_failure_rate.is_some() {
            self.max_mac_failure_rate = other.max_mac_failure_rate;
        }
        if other.replay_alert_threshold.is_some() {
            self.replay_alert_threshold = other.replay_alert_threshold;
        }
        if other.expired_alert_threshold.is_some() {
            self.expired_alert_threshold = other.expired_alert_threshold;
        }
    }
}

/// Control-plane housekeeping (`control.*`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Expired-session sweep period in seconds (`control.sweep_interval_secs`). Defaults to 60.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_interval_secs: Option<u64>,
    /// Periodic stats report in seconds (`control.stats_interval_secs`). Defaults to 30.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_interval_secs: Option<u64>,
    /// Rejection monitor (`control.monitor.*`).
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl ControlConfig {
    /// Get the sweep period, using default if not configured.
    pub fn sweep_interval_secs(&self) -> u64 {
        self.sweep_interval_secs.unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS)
    }

    /// Get the stats report period, using default if not configured.
    pub fn stats_interval_secs(&self) -> u64 {
        self.stats_interval_secs.unwrap_or(DEFAULT_STATS_INTERVAL_SECS)
    }

    /// Override the fields that `other` sets, key by key within `monitor`.
    pub(super) fn merge(&mut self, other: ControlConfig) {
        if other.sweep_interval_secs.is_some() {
            self.sweep_interval_secs = other.sweep_interval_secs;
        }
        if other.stats_interval_secs.is_some() {
            self.stats_interval_secs = other.stats_interval_secs;
        }
        self.monitor.merge(other.monitor);
    }
}
