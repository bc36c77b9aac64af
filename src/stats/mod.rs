//! Gate Statistics
//!
//! Eight monotonically increasing outcome counters, sharded so that
//! concurrent processing contexts never contend on the same cache line.
//! Each context increments only the shard it was given; readers sum all
//! shards to get the totals. Counters are never reset or decremented.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of outcome counters.
pub const OUTCOME_COUNT: usize = 8;

/// Counter identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Outcome {
    /// Every frame seen.
    Total = 0,
    /// Authenticated mesh packets.
    Admitted = 1,
    /// Tag mismatch (or MAC input rejected).
    FailedMac = 2,
    /// Unknown or unverified session.
    NoSession = 3,
    /// Session idle past its TTL.
    Expired = 4,
    /// Sequence number below the watermark.
    Replay = 5,
    /// Mesh-port frame that failed structural validation.
    Malformed = 6,
    /// Every PASS verdict (admitted or not mesh traffic).
    PassedToSlowPath = 7,
}

impl Outcome {
    /// All outcomes in counter order.
    pub const ALL: [Outcome; OUTCOME_COUNT] = [
        Outcome::Total,
        Outcome::Admitted,
        Outcome::FailedMac,
        Outcome::NoSession,
        Outcome::Expired,
        Outcome::Replay,
        Outcome::Malformed,
        Outcome::PassedToSlowPath,
    ];

    /// Counter index.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Snake-case counter name.
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Total => "total",
            Outcome::Admitted => "admitted",
            Outcome::FailedMac => "failed_mac",
            Outcome::NoSession => "no_session",
            Outcome::Expired => "expired",
            Outcome::Replay => "replay",
            Outcome::Malformed => "malformed",
            Outcome::PassedToSlowPath => "passed_to_slow_path",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Shards
// ============================================================================

/// One context's counters, padded to a cache line.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct StatsShard {
    counters: [AtomicU64; OUTCOME_COUNT],
}

impl StatsShard {
    /// Increment a counter by one.
    #[inline]
    pub fn increment(&self, outcome: Outcome) {
        self.counters[outcome.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter.
    pub fn get(&self, outcome: Outcome) -> u64 {
        self.counters[outcome.index()].load(Ordering::Relaxed)
    }
}

/// Sharded counter set shared by all processing contexts.
#[derive(Debug)]
pub struct GateStats {
    shards: Box<[StatsShard]>,
}

impl GateStats {
    /// Create a counter set with `shards` shards (at least one).
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| StatsShard::default()).collect();
        Self { shards }
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Get the shard for a context index. Indices wrap around.
    #[inline]
    pub fn shard(&self, index: usize) -> &StatsShard {
        &self.shards[index % self.shards.len()]
    }

    /// Sum one counter over all shards.
    pub fn total(&self, outcome: Outcome) -> u64 {
        self.shards.iter().map(|s| s.get(outcome)).sum()
    }

    /// Sum all counters over all shards.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total(Outcome::Total),
            admitted: self.total(Outcome::Admitted),
            failed_mac: self.total(Outcome::FailedMac),
            no_session: self.total(Outcome::NoSession),
            expired: self.total(Outcome::Expired),
            replay: self.total(Outcome::Replay),
            malformed: self.total(Outcome::Malformed),
            passed_to_slow_path: self.total(Outcome::PassedToSlowPath),
        }
    }
}

impl Default for GateStats {
    fn default() -> Self {
        Self::new(1)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time totals of all counters.
///
/// Shards are read one after another, so a snapshot taken while packets
/// are in flight is not an atomic cut across counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub admitted: u64,
    pub failed_mac: u64,
    pub no_session: u64,
    pub expired: u64,
    pub replay: u64,
    pub malformed: u64,
    pub passed_to_slow_path: u64,
}

impl StatsSnapshot {
    /// Get a counter by outcome.
    pub fn get(&self, outcome: Outcome) -> u64 {
        match outcome {
            Outcome::Total => self.total,
            Outcome::Admitted => self.admitted,
            Outcome::FailedMac => self.failed_mac,
            Outcome::NoSession => self.no_session,
            Outcome::Expired => self.expired,
            Outcome::Replay => self.replay,
            Outcome::Malformed => self.malformed,
            Outcome::PassedToSlowPath => self.passed_to_slow_path,
        }
    }

    /// Per-counter difference since an earlier snapshot.
    pub fn delta(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total.saturating_sub(earlier.total),
            admitted: self.admitted.saturating_sub(earlier.admitted),
            failed_mac: self.failed_mac.saturating_sub(earlier.failed_mac),
            no_session: self.no_session.saturating_sub(earlier.no_session),
            expired: self.expired.saturating_sub(earlier.expired),
            replay: self.replay.saturating_sub(earlier.replay),
            malformed: self.malformed.saturating_sub(earlier.malformed),
            passed_to_slow_path: self
                .passed_to_slow_path
                .saturating_sub(earlier.passed_to_slow_path),
        }
    }

    /// Total rejected mesh frames.
    pub fn rejected(&self) -> u64 {
        self.failed_mac + self.no_session + self.expired + self.replay + self.malformed
    }

    /// Fraction of mesh authentication attempts that failed the MAC check.
    pub fn mac_failure_rate(&self) -> f64 {
        let attempts = self.admitted + self.failed_mac;
        if attempts == 0 {
            0.0
        } else {
            self.failed_mac as f64 / attempts as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_shard_alignment() {
        assert_eq!(std::mem::align_of::<StatsShard>(), 64);
    }

    #[test]
    fn test_zero_shards_clamped() {
        let stats = GateStats::new(0);
        assert_eq!(stats.shard_count(), 1);
        stats.shard(5).increment(Outcome::Total);
        assert_eq!(stats.total(Outcome::Total), 1);
    }

    #[test]
    fn test_snapshot_sums_shards() {
        let stats = GateStats::new(4);
        stats.shard(0).increment(Outcome::Admitted);
        stats.shard(1).increment(Outcome::Admitted);
        stats.shard(3).increment(Outcome::Replay);
        stats.shard(7).increment(Outcome::Replay); // wraps to 3

        let snap = stats.snapshot();
        assert_eq!(snap.admitted, 2);
        assert_eq!(snap.replay, 2);
        assert_eq!(snap.total, 0);
        assert_eq!(stats.shard(3).get(Outcome::Replay), 2);
    }

    #[test]
    fn test_snapshot_get_matches_fields() {
        let stats = GateStats::new(1);
        for (i, outcome) in Outcome::ALL.iter().enumerate() {
            for _ in 0..=i {
                stats.shard(0).increment(*outcome);
            }
        }
        let snap = stats.snapshot();
        for (i, outcome) in Outcome::ALL.iter().enumerate() {
            assert_eq!(snap.get(*outcome), i as u64 + 1, "{}", outcome);
        }
    }

    #[test]
    fn test_delta_and_rates() {
        let earlier = StatsSnapshot {
            admitted: 10,
            failed_mac: 0,
            ..Default::default()
        };
        let later = StatsSnapshot {
            admitted: 28,
            failed_mac: 2,
            replay: 1,
            ..Default::default()
        };
        let delta = later.delta(&earlier);
        assert_eq!(delta.admitted, 18);
        assert_eq!(delta.failed_mac, 2);
        assert_eq!(delta.rejected(), 3);
        assert!((delta.mac_failure_rate() - 0.1).abs() < 1e-9);
        assert_eq!(StatsSnapshot::default().mac_failure_rate(), 0.0);
    }

    #[test]
    fn test_concurrent_increments() {
        let stats = Arc::new(GateStats::new(4));
        let handles: Vec<_> = (0..8)
            .map(|ctx| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    let shard = stats.shard(ctx);
                    for _ in 0..1000 {
                        shard.increment(Outcome::Total);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.snapshot().total, 8000);
    }

    #[test]
    fn test_snapshot_yaml_field_names() {
        let yaml = serde_yaml::to_string(&StatsSnapshot::default()).unwrap();
        for outcome in Outcome::ALL {
            assert!(yaml.contains(outcome.as_str()), "{}", outcome);
        }
    }
}
