//! Meshgate: fast-path session authentication for mesh traffic
//!
//! A per-packet filter that sits in front of the slow path of a mesh node.
//! Frames addressed to the mesh port are matched to an established session,
//! checked for freshness and replay, and authenticated with a keyed tag
//! before being forwarded; everything else passes through untouched.

pub mod config;
pub mod control;
pub mod gate;
pub mod mac;
pub mod protocol;
pub mod session;
pub mod stats;

// Re-export config types
pub use config::{Config, ConfigError, ControlConfig, GateConfig, MonitorConfig};

// Re-export fast-path types
pub use gate::{Admission, Authenticator, Rejection, Stage, Verdict};
pub use mac::{packet_tag, siphash24, MacError};
pub use protocol::{classify, Classified, FrameBuilder, MeshHeader, ProtocolError};

// Re-export session types
pub use session::{
    InstallOutcome, MacKey, Session, SessionError, SessionFile, SessionId, SessionRecord,
    SessionStore,
};

// Re-export stats types
pub use stats::{GateStats, Outcome, StatsSnapshot};

// Re-export control-plane types
pub use control::{Anomaly, AnomalyKind, ControlPlane, ControlStatus, RejectionMonitor};
