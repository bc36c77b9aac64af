//! Control Plane
//!
//! The only writer of the session table: installs sessions once a
//! handshake completes, revokes and rekeys them, and periodically sweeps
//! sessions that have been idle past the TTL. The fast path reads the
//! same table concurrently.

mod monitor;

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::GateConfig;
use crate::session::{InstallOutcome, MacKey, SessionError, SessionId, SessionRecord, SessionStore};

pub use monitor::{Anomaly, AnomalyKind, Remediation, RejectionMonitor, Severity};

/// Current wall-clock time in seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Session counts reported alongside the stats snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ControlStatus {
    pub active_sessions: usize,
    pub verified_sessions: usize,
}

/// Session lifecycle management.
#[derive(Debug, Clone)]
pub struct ControlPlane {
    store: Arc<SessionStore>,
    session_ttl: u64,
}

impl ControlPlane {
    pub fn new(store: Arc<SessionStore>, config: &GateConfig) -> Self {
        Self {
            store,
            session_ttl: config.session_ttl_secs(),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Install or update one session.
    pub fn install(&self, record: &SessionRecord) -> Result<InstallOutcome, SessionError> {
        let outcome = self.store.install(record)?;
        match outcome {
            InstallOutcome::Inserted => info!(
                session = %record.session_id,
                verified = record.verified,
                "Session installed"
            ),
            InstallOutcome::Rotated => info!(session = %record.session_id, "Session rekeyed"),
            InstallOutcome::Merged => debug!(session = %record.session_id, "Session record merged"),
        }
        Ok(outcome)
    }

    /// Install a batch of records. Stops at the first failure.
    pub fn install_all(&self, records: &[SessionRecord]) -> Result<usize, SessionError> {
        for record in records {
            self.install(record)?;
        }
        Ok(records.len())
    }

    /// Remove a session. Returns false if it was not installed.
    pub fn revoke(&self, id: &SessionId) -> bool {
        let removed = self.store.remove(id).is_some();
        if removed {
            info!(session = %id, "Session revoked");
        }
        removed
    }

    /// Replace a session's key, starting a fresh sequence space.
    ///
    /// Frames tagged under the old key stop authenticating immediately.
    pub fn rotate(&self, id: &SessionId, key: MacKey, now: u64) -> Result<(), SessionError> {
        let record = SessionRecord::established(*id, key, now);
        let previous = self.store.replace(&record)?;
        info!(
            session = %id,
            replaced = previous.is_some(),
            "Session key rotated"
        );
        Ok(())
    }

    /// Mark a session's handshake complete. Returns false if not installed.
    pub fn mark_verified(&self, id: &SessionId) -> bool {
        match self.store.lookup(id) {
            Some(session) => {
                session.set_verified(true);
                debug!(session = %id, "Session verified");
                true
            }
            None => false,
        }
    }

    /// Remove sessions idle past the TTL.
    pub fn sweep_expired(&self, now: u64) -> usize {
        let removed = self.store.remove_expired(now, self.session_ttl);
        if removed > 0 {
            info!(removed, remaining = self.store.len(), "Swept expired sessions");
        }
        removed
    }

    pub fn status(&self) -> ControlStatus {
        ControlStatus {
            active_sessions: self.store.len(),
            verified_sessions: self.store.verified_count(),
        }
    }

    /// Sweep expired sessions every `period` until `shutdown` turns true
    /// or its sender is dropped.
    pub async fn run_sweeper(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(period);

        debug!(period_secs = period.as_secs(), "Session sweeper started");

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.sweep_expired(now_secs());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("Session sweeper stopped");
    }
}
