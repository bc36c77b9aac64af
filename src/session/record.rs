//! Session installation records.
//!
//! The control plane hands sessions to the fast path as records. Records
//! also serialize to YAML (hex-encoded id and key) so a set of sessions can
//! be provisioned from a file:
//!
//! ```yaml
//! sessions:
//!   - session_id: "000102030405060708090a0b0c0d0e0f"
//!     mac_key: "f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff"
//!     verified: true
//!     last_activity: 1700000000
//!     expected_min_seq: 0
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{MacKey, SessionError, SessionId};

/// Insert-or-update request for one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session identifier (table key).
    pub session_id: SessionId,
    /// MAC key derived from the handshake.
    pub mac_key: MacKey,
    /// Handshake completed. Defaults to true.
    #[serde(default = "SessionRecord::default_verified")]
    pub verified: bool,
    /// Last activity timestamp in seconds.
    #[serde(default)]
    pub last_activity: u64,
    /// Initial anti-replay watermark.
    #[serde(default)]
    pub expected_min_seq: u32,
}

impl SessionRecord {
    /// Record for a freshly completed handshake: verified, watermark 0.
    pub fn established(session_id: SessionId, mac_key: MacKey, now: u64) -> Self {
        Self {
            session_id,
            mac_key,
            verified: true,
            last_activity: now,
            expected_min_seq: 0,
        }
    }

    fn default_verified() -> bool {
        true
    }
}

/// A list of session records loaded from YAML.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionFile {
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
}

impl SessionFile {
    /// Load session records from a YAML file.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let contents = std::fs::read_to_string(path).map_err(|e| SessionError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| SessionError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
