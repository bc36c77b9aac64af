//! Rejection telemetry monitor.
//!
//! The fast path never retries or escalates on its own; it only counts.
//! The monitor compares successive counter snapshots and turns rising
//! rejection counts into anomalies with a suggested remediation for the
//! control plane to act on.

use serde::Serialize;
use std::fmt;
use tracing::warn;

use crate::config::MonitorConfig;
use crate::stats::StatsSnapshot;

/// Kind of anomaly detected over one observation interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Frames arrived below a session's watermark.
    ReplayAttack,
    /// Too large a share of authentication attempts failed the MAC check.
    HighFailureRate,
    /// Peers keep sending on sessions that aged out.
    SessionExpired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Suggested control-plane action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Remediation {
    /// Revoke the offending session.
    BlockSession,
    /// Rekey sessions under suspicion.
    RotateKeys,
    /// Ask peers to run a fresh handshake.
    Rehandshake,
}

impl AnomalyKind {
    fn severity(self) -> Severity {
        match self {
            AnomalyKind::ReplayAttack => Severity::Critical,
            AnomalyKind::HighFailureRate => Severity::High,
            AnomalyKind::SessionExpired => Severity::Medium,
        }
    }

    fn remediation(self) -> Remediation {
        match self {
            AnomalyKind::ReplayAttack => Remediation::BlockSession,
            AnomalyKind::HighFailureRate => Remediation::RotateKeys,
            AnomalyKind::SessionExpired => Remediation::Rehandshake,
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnomalyKind::ReplayAttack => "replay_attack",
            AnomalyKind::HighFailureRate => "high_failure_rate",
            AnomalyKind::SessionExpired => "session_expired",
        };
        f.write_str(name)
    }
}

/// One detected anomaly.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    /// Rejections of this kind in the interval.
    pub count: u64,
    pub remediation: Remediation,
}

impl Anomaly {
    fn new(kind: AnomalyKind, count: u64) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            count,
            remediation: kind.remediation(),
        }
    }
}

/// Detects anomalies from the change between counter snapshots.
#[derive(Debug, Clone)]
pub struct RejectionMonitor {
    config: MonitorConfig,
    previous: StatsSnapshot,
}

impl RejectionMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_baseline(config, StatsSnapshot::default())
    }

    /// Start observing from `baseline` instead of all-zero counters.
    pub fn with_baseline(config: MonitorConfig, baseline: StatsSnapshot) -> Self {
        Self {
            config,
            previous: baseline,
        }
    }

    /// Compare `current` with the previous observation and report anomalies.
    ///
    /// Results are ordered by descending severity.
    pub fn observe(&mut self, current: &StatsSnapshot) -> Vec<Anomaly> {
        let delta = current.delta(&self.previous);
        self.previous = *current;

        let mut anomalies = Vec::new();

        let threshold = self.config.replay_alert_threshold();
        if threshold > 0 && delta.replay >= threshold {
            anomalies.push(Anomaly::new(AnomalyKind::ReplayAttack, delta.replay));
        }

        let max_rate = self.config.max_mac_failure_rate();
        if delta.failed_mac > 0 && delta.mac_failure_rate() > max_rate {
            anomalies.push(Anomaly::new(AnomalyKind::HighFailureRate, delta.failed_mac));
        }

        let threshold = self.config.expired_alert_threshold();
        if threshold > 0 && delta.expired >= threshold {
            anomalies.push(Anomaly::new(AnomalyKind::SessionExpired, delta.expired));
        }

        for anomaly in &anomalies {
            warn!(
                kind = %anomaly.kind,
                severity = ?anomaly.severity,
                count = anomaly.count,
                remediation = ?anomaly.remediation,
                "Rejection anomaly detected"
            );
        }

        anomalies
    }
}
