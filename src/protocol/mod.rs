//! Mesh Wire Format
//!
//! Definitions for the frames the fast path inspects. Mesh traffic is carried
//! as IPv4/UDP to a single well-known port, followed by a fixed-size mesh
//! header and an opaque (still encrypted) payload:
//!
//! ```text
//! [ethernet:14][ipv4:20+][udp:8][session_id:16][seq:4 BE][mac_tag:8 BE][payload_len:2 BE][payload:0..1400]
//! ```
//!
//! The header is authenticated with a keyed tag (see `crate::mac`); the
//! payload is only authenticated here, decryption happens in the slow path.
//!
//! Everything that is not addressed to the mesh port passes through
//! untouched. Once a frame is known to be mesh traffic, every structural
//! violation is a `ProtocolError` and the frame is dropped as malformed.

mod builder;
mod error;
mod wire;

pub use builder::FrameBuilder;
pub use error::ProtocolError;
pub use wire::{classify, Classified, MeshHeader};

/// Ethernet header length (no VLAN tags).
pub const ETH_HDR_LEN: usize = 14;

/// EtherType for IPv4.
pub const ETH_P_IPV4: u16 = 0x0800;

/// Minimum IPv4 header length (IHL = 5).
pub const IPV4_MIN_HDR_LEN: usize = 20;

/// IP protocol number for UDP.
pub const IPPROTO_UDP: u8 = 17;

/// UDP header length.
pub const UDP_HDR_LEN: usize = 8;

/// Default well-known UDP port for mesh traffic.
pub const DEFAULT_MESH_PORT: u16 = 10809;

/// Session identifier length.
pub const SESSION_ID_LEN: usize = 16;

/// Sequence number length (network byte order on the wire).
pub const SEQ_LEN: usize = 4;

/// Authentication tag length (network byte order on the wire).
pub const TAG_LEN: usize = 8;

/// Declared payload length field size.
pub const PAYLOAD_LEN_LEN: usize = 2;

/// Fixed mesh header size: session_id + seq + tag + payload_len.
pub const MESH_HDR_LEN: usize = SESSION_ID_LEN + SEQ_LEN + TAG_LEN + PAYLOAD_LEN_LEN; // 30

/// Largest payload a mesh frame may declare.
pub const MAX_PAYLOAD_LEN: usize = 1400;

/// Offsets of the mesh header fields, relative to the start of the mesh header.
pub(crate) const OFF_SESSION_ID: usize = 0;
pub(crate) const OFF_SEQ: usize = OFF_SESSION_ID + SESSION_ID_LEN;
pub(crate) const OFF_TAG: usize = OFF_SEQ + SEQ_LEN;
pub(crate) const OFF_PAYLOAD_LEN: usize = OFF_TAG + TAG_LEN;
