//! Concurrent session table.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use super::{Session, SessionError, SessionId, SessionRecord};

/// Result of installing a session record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallOutcome {
    /// No entry existed; a new session was inserted.
    Inserted,
    /// An entry with the same key existed; the record was folded into it.
    Merged,
    /// An entry with a different key existed and was replaced (rekey).
    Rotated,
}

/// Session table keyed by `SessionId`.
///
/// Lookups hand out `Arc<Session>` so the fast path never holds a shard
/// lock while verifying a tag. Entries are only inserted, replaced or
/// removed through the control-plane methods (`install`, `remove`,
/// `remove_expired`).
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<Session>>,
    /// Soft capacity limit for new entries (`None` = unbounded).
    max_sessions: Option<usize>,
}

impl SessionStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that refuses new entries beyond `max_sessions`.
    pub fn with_max_sessions(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::with_capacity(max_sessions),
            max_sessions: Some(max_sessions),
        }
    }

    /// Look up a session by id.
    pub fn lookup(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Record authenticated activity and advance the watermark past `seq`.
    ///
    /// Returns false if the session is absent or the watermark was already
    /// above `seq`.
    pub fn update(&self, id: &SessionId, last_activity: u64, seq: u32) -> bool {
        match self.lookup(id) {
            Some(session) => {
                let advanced = session.advance(seq);
                if advanced {
                    session.touch(last_activity);
                }
                advanced
            }
            None => false,
        }
    }

    /// Insert or update a session from a record.
    ///
    /// Re-installing a record with the same key merges into the existing
    /// entry without lowering its watermark or freshness, so repeated
    /// installs are idempotent. A different key replaces the entry.
    pub fn install(&self, record: &SessionRecord) -> Result<InstallOutcome, SessionError> {
        self.check_capacity(&record.session_id)?;

        let outcome = match self.sessions.entry(record.session_id) {
            Entry::Occupied(mut entry) => {
                if entry.get().key() == &record.mac_key {
                    entry.get().merge(record);
                    InstallOutcome::Merged
                } else {
                    entry.insert(Arc::new(Session::from_record(record)));
                    InstallOutcome::Rotated
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Session::from_record(record)));
                InstallOutcome::Inserted
            }
        };
        Ok(outcome)
    }

    /// Insert a record unconditionally, replacing any existing entry.
    ///
    /// Unlike `install`, the replacement always starts from the record's
    /// watermark. Returns the previous entry, if any.
    pub fn replace(&self, record: &SessionRecord) -> Result<Option<Arc<Session>>, SessionError> {
        self.check_capacity(&record.session_id)?;
        Ok(self
            .sessions
            .insert(record.session_id, Arc::new(Session::from_record(record))))
    }

    /// Refuse a new id once the table is at capacity.
    ///
    /// Checked before taking the entry lock, so the limit is soft.
    fn check_capacity(&self, id: &SessionId) -> Result<(), SessionError> {
        if let Some(max) = self.max_sessions {
            if !self.sessions.contains_key(id) && self.sessions.len() >= max {
                return Err(SessionError::StoreFull { max });
            }
        }
        Ok(())
    }

    /// Remove a session.
    pub fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Remove every session idle for longer than `ttl`. Returns the count removed.
    pub fn remove_expired(&self, now: u64, ttl: u64) -> usize {
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let keep = !session.is_expired(now, ttl);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Check if a session exists.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of verified sessions.
    pub fn verified_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_verified())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MacKey;

    fn make_id(val: u8) -> SessionId {
        SessionId::from_bytes([val; 16])
    }

    fn make_record(val: u8, key: u8) -> SessionRecord {
        SessionRecord::established(make_id(val), MacKey::from_bytes([key; 16]), 1000)
    }

    #[test]
    fn test_install_and_lookup() {
        let store = SessionStore::new();
        assert_eq!(store.install(&make_record(1, 1)).unwrap(), InstallOutcome::Inserted);

        let session = store.lookup(&make_id(1)).unwrap();
        assert!(session.is_verified());
        assert_eq!(session.expected_min_seq(), 0);
        assert!(store.lookup(&make_id(2)).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reinstall_identical_is_idempotent() {
        let store = SessionStore::new();
        let record = make_record(1, 1);
        store.install(&record).unwrap();
        assert!(store.update(&make_id(1), 2000, 5));

        assert_eq!(store.install(&record).unwrap(), InstallOutcome::Merged);
        let session = store.lookup(&make_id(1)).unwrap();
        assert_eq!(session.expected_min_seq(), 6);
        assert_eq!(session.last_activity(), 2000);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_install_new_key_rotates() {
        let store = SessionStore::new();
        store.install(&make_record(1, 1)).unwrap();
        store.update(&make_id(1), 2000, 50);

        assert_eq!(store.install(&make_record(1, 2)).unwrap(), InstallOutcome::Rotated);
        let session = store.lookup(&make_id(1)).unwrap();
        assert_eq!(session.key(), &MacKey::from_bytes([2; 16]));
        assert_eq!(session.expected_min_seq(), 0);
    }

    #[test]
    fn test_lookup_survives_rotation() {
        // A context holding the old entry keeps a consistent view.
        let store = SessionStore::new();
        store.install(&make_record(1, 1)).unwrap();
        let old = store.lookup(&make_id(1)).unwrap();

        store.install(&make_record(1, 2)).unwrap();
        assert_eq!(old.key(), &MacKey::from_bytes([1; 16]));
    }

    #[test]
    fn test_replace_resets_watermark() {
        let store = SessionStore::new();
        let record = make_record(1, 1);
        store.install(&record).unwrap();
        store.update(&make_id(1), 2000, 30);

        let previous = store.replace(&record).unwrap();
        assert_eq!(previous.unwrap().expected_min_seq(), 31);
        assert_eq!(store.lookup(&make_id(1)).unwrap().expected_min_seq(), 0);
    }

    #[test]
    fn test_update_missing_session() {
        let store = SessionStore::new();
        assert!(!store.update(&make_id(9), 1, 1));
    }

    #[test]
    fn test_update_rejects_stale_seq() {
        let store = SessionStore::new();
        store.install(&make_record(1, 1)).unwrap();
        assert!(store.update(&make_id(1), 1500, 10));
        assert!(!store.update(&make_id(1), 1600, 3));
        // Stale update does not refresh activity
        assert_eq!(store.lookup(&make_id(1)).unwrap().last_activity(), 1500);
    }

    #[test]
    fn test_remove() {
        let store = SessionStore::new();
        store.install(&make_record(1, 1)).unwrap();
        assert!(store.remove(&make_id(1)).is_some());
        assert!(store.remove(&make_id(1)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_expired() {
        let store = SessionStore::new();
        store.install(&make_record(1, 1)).unwrap();
        store.install(&make_record(2, 2)).unwrap();
        store.update(&make_id(2), 4000, 1);

        // Session 1 idle since 1000, session 2 since 4000
        let removed = store.remove_expired(1000 + 3601, 3600);
        assert_eq!(removed, 1);
        assert!(!store.contains(&make_id(1)));
        assert!(store.contains(&make_id(2)));
    }

    #[test]
    fn test_capacity_limit() {
        let store = SessionStore::with_max_sessions(2);
        store.install(&make_record(1, 1)).unwrap();
        store.install(&make_record(2, 2)).unwrap();
        assert!(matches!(
            store.install(&make_record(3, 3)),
            Err(SessionError::StoreFull { max: 2 })
        ));
        // Updating an existing entry is still allowed when full
        assert_eq!(store.install(&make_record(2, 2)).unwrap(), InstallOutcome::Merged);
    }

    #[test]
    fn test_verified_count() {
        let store = SessionStore::new();
        store.install(&make_record(1, 1)).unwrap();
        let mut unverified = make_record(2, 2);
        unverified.verified = false;
        store.install(&unverified).unwrap();

        assert_eq!(store.verified_count(), 1);
        assert_eq!(store.len(), 2);
        assert!(!store.lookup(&make_id(2)).unwrap().is_verified());
    }
}
