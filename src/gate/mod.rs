//! Fast-Path Authenticator
//!
//! Decides, per frame, whether mesh traffic is forwarded to the slow path
//! (PASS) or discarded (DROP). Each frame is processed to a verdict in a
//! single pass through a fixed sequence of gates:
//!
//! ```text
//! Received → Classified → SessionResolved → ReplayChecked → MacVerified → Admitted
//! ```
//!
//! Any gate may short-circuit to `Rejected(reason)`. Frames that are not
//! mesh traffic at all pass through untouched.
//!
//! The authenticator never mutates the session table. On admission it
//! raises the session's watermark and freshness through the session's
//! atomics; the watermark commit is a single `fetch_max`, so concurrent
//! contexts can never both admit the same sequence number.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::GateConfig;
use crate::mac::{packet_tag, tags_equal};
use crate::protocol::{classify, Classified, MeshHeader};
use crate::session::{SessionId, SessionStore};
use crate::stats::{GateStats, Outcome, StatsShard};


/// Per-frame processing stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Received,
    Classified,
    SessionResolved,
    ReplayChecked,
    MacVerified,
    Admitted,
}

/// Reason a mesh frame was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// Structurally invalid or truncated mesh frame.
    Malformed,
    /// Unknown or unverified session.
    NoSession,
    /// Session idle past its TTL.
    Expired,
    /// Sequence number below the session watermark.
    Replay,
    /// Authentication tag mismatch.
    MacFailure,
}

impl Rejection {
    /// Stage a frame has passed when it is rejected for this reason.
    ///
    /// A replay caught by the post-MAC commit is reported at
    /// `Stage::MacVerified` in the rejection log instead.
    pub fn stage(self) -> Stage {
        match self {
            Rejection::Malformed => Stage::Received,
            Rejection::NoSession | Rejection::Expired => Stage::Classified,
            Rejection::Replay => Stage::SessionResolved,
            Rejection::MacFailure => Stage::ReplayChecked,
        }
    }

    /// Counter incremented for this rejection.
    pub fn outcome(self) -> Outcome {
        match self {
            Rejection::Malformed => Outcome::Malformed,
            Rejection::NoSession => Outcome::NoSession,
            Rejection::Expired => Outcome::Expired,
            Rejection::Replay => Outcome::Replay,
            Rejection::MacFailure => Outcome::FailedMac,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::Malformed => "malformed",
            Rejection::NoSession => "no_session",
            Rejection::Expired => "expired",
            Rejection::Replay => "replay",
            Rejection::MacFailure => "mac_failure",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict handed to the slow path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Forward the raw frame unchanged.
    Pass,
    /// Discard the frame.
    Drop,
}

/// Result of processing one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Authenticated mesh frame.
    Admitted { session_id: SessionId, seq: u32 },
    /// Not mesh traffic.
    PassThrough,
    /// Mesh frame rejected at one of the gates.
    Rejected(Rejection),
}

impl Admission {
    pub fn verdict(&self) -> Verdict {
        match self {
            Admission::Admitted { .. } | Admission::PassThrough => Verdict::Pass,
            Admission::Rejected(_) => Verdict::Drop,
        }
    }

    /// Rejection reason, if rejected.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Admission::Rejected(r) => Some(*r),
            _ => None,
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }

    /// Last stage the frame reached.
    pub fn stage(&self) -> Stage {
        match self {
            Admission::Admitted { .. } => Stage::Admitted,
            Admission::PassThrough => Stage::Classified,
            Admission::Rejected(r) => r.stage(),
        }
    }
}

// ============================================================================
// Authenticator
// ============================================================================

/// Session-authenticated packet filter.
///
/// Cheap to share: all state lives behind the `Arc`s, and `process` takes
/// `&self`, so one authenticator serves every processing context.
#[derive(Debug, Clone)]
pub struct Authenticator {
    store: Arc<SessionStore>,
    stats: Arc<GateStats>,
    mesh_port: u16,
    session_ttl: u64,
}

impl Authenticator {
    /// Create an authenticator over a session table and counter set.
    pub fn new(store: Arc<SessionStore>, stats: Arc<GateStats>, config: &GateConfig) -> Self {
        Self {
            store,
            stats,
            mesh_port: config.mesh_port(),
            session_ttl: config.session_ttl_secs(),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn stats(&self) -> &Arc<GateStats> {
        &self.stats
    }

    pub fn mesh_port(&self) -> u16 {
        self.mesh_port
    }

    pub fn session_ttl(&self) -> u64 {
        self.session_ttl
    }

    /// Process one frame on context `shard` and count the outcome.
    ///
    /// `now` is the current time in seconds, on the same clock the control
    /// plane uses for `last_activity`.
    pub fn process(&self, frame: &[u8], now: u64, shard: usize) -> Admission {
        let counters = self.stats.shard(shard);
        counters.increment(Outcome::Total);

        let admission = self.authenticate(frame, now);
        record(counters, &admission);
        admission
    }

    /// Run the gates for one frame without touching the counters.
    pub fn authenticate(&self, frame: &[u8], now: u64) -> Admission {
        let header = match classify(frame, self.mesh_port) {
            Ok(Classified::Mesh(header)) => header,
            Ok(Classified::NotMesh) => return Admission::PassThrough,
            Err(e) => {
                trace!(
                    len = frame.len(),
                    stage = ?Stage::Received,
                    error = %e,
                    "Malformed mesh frame"
                );
                return Admission::Rejected(Rejection::Malformed);
            }
        };

        match self.check(frame, &header, now) {
            Ok(()) => Admission::Admitted {
                session_id: header.session_id,
                seq: header.seq,
            },
            Err((stage, reason)) => {
                debug!(
                    session = %header.session_id,
                    seq = header.seq,
                    stage = ?stage,
                    reason = %reason,
                    "Mesh frame rejected"
                );
                Admission::Rejected(reason)
            }
        }
    }

    /// Session, freshness, replay and MAC gates for a classified frame.
    ///
    /// Errors carry the stage the frame had passed when it was dropped.
    fn check(
        &self,
        frame: &[u8],
        header: &MeshHeader,
        now: u64,
    ) -> Result<(), (Stage, Rejection)> {
        let reject = |reason: Rejection| (reason.stage(), reason);

        let session = self
            .store
            .lookup(&header.session_id)
            .ok_or_else(|| reject(Rejection::NoSession))?;

        if !session.is_verified() {
            return Err(reject(Rejection::NoSession));
        }

        if session.is_expired(now, self.session_ttl) {
            return Err(reject(Rejection::Expired));
        }

        // Cheap pre-check so stale frames never pay for a MAC.
        if session.is_replay(header.seq) {
            return Err(reject(Rejection::Replay));
        }

        let expected = packet_tag(
            session.key(),
            &header.session_id,
            header.seq,
            header.payload(frame),
        )
        .map_err(|_| reject(Rejection::MacFailure))?;
        if !tags_equal(expected, header.tag) {
            return Err(reject(Rejection::MacFailure));
        }

        // Commit. Loses if another context admitted this seq (or later) first.
        if !session.advance(header.seq) {
            return Err((Stage::MacVerified, Rejection::Replay));
        }
        session.touch(now);
        Ok(())
    }
}

/// Count the outcome of one frame.
fn record(counters: &StatsShard, admission: &Admission) {
    match admission {
        Admission::Admitted { .. } => {
            counters.increment(Outcome::Admitted);
            counters.increment(Outcome::PassedToSlowPath);
        }
        Admission::PassThrough => counters.increment(Outcome::PassedToSlowPath),
        Admission::Rejected(reason) => counters.increment(reason.outcome()),
    }
}
