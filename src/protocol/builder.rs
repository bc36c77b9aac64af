//! Mesh frame construction.
//!
//! Builds complete ethernet/IPv4/UDP frames carrying a tagged mesh header.
//! Used by sending peers, the replay tool, tests and benchmarks.

use super::{
    ProtocolError, DEFAULT_MESH_PORT, ETH_HDR_LEN, ETH_P_IPV4, IPPROTO_UDP, IPV4_MIN_HDR_LEN,
    MAX_PAYLOAD_LEN, MESH_HDR_LEN, UDP_HDR_LEN,
};
use crate::mac::packet_tag;
use crate::session::{MacKey, SessionId};

/// Default source port for built frames.
const DEFAULT_SRC_PORT: u16 = 40000;

/// Builder for tagged mesh frames belonging to one session.
#[derive(Clone, Debug)]
pub struct FrameBuilder {
    session_id: SessionId,
    key: MacKey,
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
    src_port: u16,
    dst_port: u16,
}

impl FrameBuilder {
    /// Create a builder for `session_id`, tagging with `key`.
    pub fn new(session_id: SessionId, key: MacKey) -> Self {
        Self {
            session_id,
            key,
            src_mac: [0x02, 0, 0, 0, 0, 0x01],
            dst_mac: [0x02, 0, 0, 0, 0, 0x02],
            src_ip: [10, 0, 0, 1],
            dst_ip: [10, 0, 0, 2],
            src_port: DEFAULT_SRC_PORT,
            dst_port: DEFAULT_MESH_PORT,
        }
    }

    /// Set the destination UDP port (the mesh port of the receiver).
    pub fn with_dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    /// Set source and destination IPv4 addresses.
    pub fn with_addrs(mut self, src_ip: [u8; 4], dst_ip: [u8; 4]) -> Self {
        self.src_ip = src_ip;
        self.dst_ip = dst_ip;
        self
    }

    /// Session this builder tags frames for.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Build a frame with sequence number `seq` and the given payload.
    pub fn build(&self, seq: u32, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLong {
                max: MAX_PAYLOAD_LEN,
                got: payload.len(),
            });
        }
        let tag = packet_tag(&self.key, &self.session_id, seq, payload)?;

        let udp_len = UDP_HDR_LEN + MESH_HDR_LEN + payload.len();
        let ip_total_len = IPV4_MIN_HDR_LEN + udp_len;
        let frame_len = ETH_HDR_LEN + ip_total_len;
        if ip_total_len > u16::MAX as usize {
            return Err(ProtocolError::FrameTooLarge(frame_len));
        }

        let mut buf = Vec::with_capacity(frame_len);

        // Ethernet
        buf.extend_from_slice(&self.dst_mac);
        buf.extend_from_slice(&self.src_mac);
        buf.extend_from_slice(&ETH_P_IPV4.to_be_bytes());

        // IPv4 (no options, DF set)
        let mut ip = [0u8; IPV4_MIN_HDR_LEN];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&(ip_total_len as u16).to_be_bytes());
        ip[6..8].copy_from_slice(&0x4000u16.to_be_bytes());
        ip[8] = 64;
        ip[9] = IPPROTO_UDP;
        ip[12..16].copy_from_slice(&self.src_ip);
        ip[16..20].copy_from_slice(&self.dst_ip);
        let cksum = ip_checksum(&ip);
        ip[10..12].copy_from_slice(&cksum.to_be_bytes());
        buf.extend_from_slice(&ip);

        // UDP (checksum optional over IPv4)
        buf.extend_from_slice(&self.src_port.to_be_bytes());
        buf.extend_from_slice(&self.dst_port.to_be_bytes());
        buf.extend_from_slice(&(udp_len as u16).to_be_bytes());
        buf.extend_from_slice(&[0, 0]);

        // Mesh header + payload
        buf.extend_from_slice(self.session_id.as_bytes());
        buf.extend_from_slice(&seq.to_be_bytes());
        buf.extend_from_slice(&tag.to_be_bytes());
        buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        buf.extend_from_slice(payload);

        debug_assert_eq!(buf.len(), frame_len);
        Ok(buf)
    }
}

/// RFC 1071 internet checksum.
fn ip_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;
    while i + 1 < data.len() {
        sum += u16::from_be_bytes([data[i], data[i + 1]]) as u32;
        i += 2;
    }
    if i < data.len() {
        sum += (data[i] as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}
