//! Per-session state shared between the control plane and the fast path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{MacKey, SessionId, SessionRecord};

/// Watermark value after `u32::MAX` has been admitted.
///
/// No sequence number can satisfy it; the session must be rekeyed.
pub const EXHAUSTED_WATERMARK: u64 = 1 << 32;

/// A single authenticated session.
///
/// Identity and key are immutable for the lifetime of the entry; a rekey
/// replaces the entry. The mutable fields are atomics so that concurrent
/// packets for the same session never need a lock.
#[derive(Debug)]
pub struct Session {
    /// Session identifier (table key).
    id: SessionId,
    /// MAC key from the completed handshake.
    key: MacKey,
    /// Set by the control plane once the handshake is complete.
    verified: AtomicBool,
    /// Last successfully authenticated packet (seconds).
    /// Advisory: concurrent writers race with last-write-wins.
    last_activity: AtomicU64,
    /// Minimum sequence number accepted next. Never decreases.
    ///
    /// Held as u64 so that admitting `u32::MAX` can still raise it.
    expected_min_seq: AtomicU64,
}

impl Session {
    /// Create a new session entry.
    pub fn new(
        id: SessionId,
        key: MacKey,
        verified: bool,
        last_activity: u64,
        expected_min_seq: u32,
    ) -> Self {
        Self {
            id,
            key,
            verified: AtomicBool::new(verified),
            last_activity: AtomicU64::new(last_activity),
            expected_min_seq: AtomicU64::new(expected_min_seq as u64),
        }
    }

    /// Create a session entry from an installation record.
    pub fn from_record(record: &SessionRecord) -> Self {
        Self::new(
            record.session_id,
            record.mac_key.clone(),
            record.verified,
            record.last_activity,
            record.expected_min_seq,
        )
    }

    /// Get the session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Get the MAC key.
    pub fn key(&self) -> &MacKey {
        &self.key
    }

    /// Whether the handshake for this session has completed.
    pub fn is_verified(&self) -> bool {
        self.verified.load(Ordering::Acquire)
    }

    /// Mark the session verified or unverified.
    pub fn set_verified(&self, verified: bool) {
        self.verified.store(verified, Ordering::Release);
    }

    /// Last activity timestamp (seconds).
    pub fn last_activity(&self) -> u64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    /// Current anti-replay watermark.
    pub fn expected_min_seq(&self) -> u64 {
        self.expected_min_seq.load(Ordering::Acquire)
    }

    /// Seconds since the last authenticated packet (0 if the clock is behind).
    pub fn idle_time(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_activity())
    }

    /// Check whether the session has been idle for longer than `ttl`.
    pub fn is_expired(&self, now: u64, ttl: u64) -> bool {
        self.idle_time(now) > ttl
    }

    /// Check whether `seq` is below the watermark.
    pub fn is_replay(&self, seq: u32) -> bool {
        (seq as u64) < self.expected_min_seq()
    }

    /// Raise the watermark to at least `seq + 1`.
    ///
    /// Returns false if the watermark was already above `seq`, i.e. another
    /// context admitted this or a later sequence number first. The watermark
    /// is never lowered.
    pub fn advance(&self, seq: u32) -> bool {
        let prev = self
            .expected_min_seq
            .fetch_max(seq as u64 + 1, Ordering::AcqRel);
        prev <= seq as u64
    }

    /// Record authenticated activity at `now`.
    pub fn touch(&self, now: u64) {
        self.last_activity.store(now, Ordering::Relaxed);
    }

    /// Fold a re-installed record for the same key into this entry.
    ///
    /// The verification flag is taken from the record; freshness and the
    /// watermark only move forward.
    pub(crate) fn merge(&self, record: &SessionRecord) {
        self.set_verified(record.verified);
        self.last_activity
            .fetch_max(record.last_activity, Ordering::Relaxed);
        self.expected_min_seq
            .fetch_max(record.expected_min_seq as u64, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn make_session(min_seq: u32) -> Session {
        Session::new(
            SessionId::from_bytes([1; 16]),
            MacKey::from_bytes([2; 16]),
            true,
            1000,
            min_seq,
        )
    }

    #[test]
    fn test_advance_raises_watermark() {
        let s = make_session(0);
        assert!(s.advance(5));
        assert_eq!(s.expected_min_seq(), 6);
        assert!(s.is_replay(5));
        assert!(s.is_replay(3));
        assert!(!s.is_replay(6));
    }

    #[test]
    fn test_advance_never_lowers() {
        let s = make_session(0);
        assert!(s.advance(10));
        assert!(!s.advance(4));
        assert_eq!(s.expected_min_seq(), 11);
    }

    #[test]
    fn test_advance_same_seq_twice() {
        let s = make_session(0);
        assert!(s.advance(7));
        assert!(!s.advance(7));
    }

    #[test]
    fn test_advance_u32_max_exhausts() {
        let s = make_session(0);
        assert!(s.advance(u32::MAX));
        assert_eq!(s.expected_min_seq(), EXHAUSTED_WATERMARK);
        assert!(s.is_replay(u32::MAX));
    }

    #[test]
    fn test_expiry_boundary() {
        let s = make_session(0);
        assert!(!s.is_expired(1000 + 3600, 3600));
        assert!(s.is_expired(1000 + 3601, 3600));
        // Clock behind last_activity is never expired
        assert!(!s.is_expired(10, 3600));
    }

    #[test]
    fn test_merge_only_moves_forward() {
        let s = make_session(0);
        s.advance(20);
        s.touch(5000);

        let record = SessionRecord {
            session_id: SessionId::from_bytes([1; 16]),
            mac_key: MacKey::from_bytes([2; 16]),
            verified: false,
            last_activity: 1000,
            expected_min_seq: 0,
        };
        s.merge(&record);

        assert_eq!(s.expected_min_seq(), 21);
        assert_eq!(s.last_activity(), 5000);
        assert!(!s.is_verified());
    }

    #[test]
    fn test_concurrent_advance_single_winner() {
        // Every thread races to admit the same sequence number.
        let s = Arc::new(make_session(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&s);
                thread::spawn(move || s.advance(42))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(s.expected_min_seq(), 43);
    }
}
