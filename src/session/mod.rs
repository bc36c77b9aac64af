//! Session State
//!
//! Sessions are keyed by a 16-byte identifier and carry the MAC key derived
//! from a completed PQC handshake, a verification flag, the last activity
//! time and the anti-replay watermark.
//!
//! ## Ownership
//!
//! The control plane owns the table: it inserts, rotates and removes
//! entries. The fast path only reads sessions and advances two scalar
//! fields in place (`last_activity` and the watermark), using atomics so
//! that packets for the same session can be processed concurrently on
//! independent contexts without locks.

mod entry;
mod record;
mod store;

use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::protocol::SESSION_ID_LEN;

pub use entry::{Session, EXHAUSTED_WATERMARK};
pub use record::{SessionFile, SessionRecord};
pub use store::{InstallOutcome, SessionStore};

/// MAC key length.
pub const MAC_KEY_LEN: usize = 16;

/// Errors related to session identifiers, keys and the session table.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session id length: expected 16, got {0}")]
    InvalidIdLength(usize),

    #[error("invalid mac key length: expected 16, got {0}")]
    InvalidKeyLength(usize),

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("session table full: max {max} entries")]
    StoreFull { max: usize },

    #[error("failed to read session file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse session file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

// ============================================================================
// Session Identifier
// ============================================================================

/// Opaque 16-byte session identifier, unique per active peer pairing.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId([u8; SESSION_ID_LEN]);

impl SessionId {
    /// Create a SessionId from a 16-byte array.
    pub fn from_bytes(bytes: [u8; SESSION_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a SessionId from a slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self, SessionError> {
        if slice.len() != SESSION_ID_LEN {
            return Err(SessionError::InvalidIdLength(slice.len()));
        }
        let mut bytes = [0u8; SESSION_ID_LEN];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Generate a random session identifier.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; SESSION_ID_LEN] {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&hex::decode(s)?)
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// ============================================================================
// MAC Key
// ============================================================================

/// 16-byte symmetric key derived from a completed handshake.
///
/// Used only as MAC input; `Debug` never prints the key material.
#[derive(Clone, PartialEq, Eq)]
pub struct MacKey([u8; MAC_KEY_LEN]);

impl MacKey {
    /// Create a key from a 16-byte array.
    pub fn from_bytes(bytes: [u8; MAC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a key from a slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self, SessionError> {
        if slice.len() != MAC_KEY_LEN {
            return Err(SessionError::InvalidKeyLength(slice.len()));
        }
        let mut bytes = [0u8; MAC_KEY_LEN];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; MAC_KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Return the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; MAC_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for MacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MacKey(..)")
    }
}

impl FromStr for MacKey {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&hex::decode(s)?)
    }
}

impl Serialize for MacKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for MacKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_hex_roundtrip() {
        let id = SessionId::from_bytes([0xAB; 16]);
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert_eq!(id.to_string().len(), 32);
    }

    #[test]
    fn test_session_id_wrong_length() {
        assert!(matches!(
            SessionId::from_slice(&[0u8; 15]),
            Err(SessionError::InvalidIdLength(15))
        ));
        assert!(matches!(
            "abcd".parse::<SessionId>(),
            Err(SessionError::InvalidIdLength(2))
        ));
    }

    #[test]
    fn test_session_id_bad_hex() {
        assert!(matches!(
            "zz".repeat(16).parse::<SessionId>(),
            Err(SessionError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_session_id_generate_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn test_mac_key_debug_redacted() {
        let key = MacKey::from_bytes([0x42; 16]);
        let debug = format!("{:?}", key);
        assert_eq!(debug, "MacKey(..)");
        assert!(!debug.contains("42"));
    }

    #[test]
    fn test_mac_key_wrong_length() {
        assert!(matches!(
            MacKey::from_slice(&[0u8; 32]),
            Err(SessionError::InvalidKeyLength(32))
        ));
    }
}
