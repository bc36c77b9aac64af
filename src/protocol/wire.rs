//! Frame classification.
//!
//! Sequential, bounds-checked parse of ethernet → IPv4 → UDP → mesh header.
//! No field is read before the region containing it has been checked
//! against the end of the frame.

use std::ops::Range;

use super::{
    ProtocolError, ETH_HDR_LEN, ETH_P_IPV4, IPPROTO_UDP, IPV4_MIN_HDR_LEN, MAX_PAYLOAD_LEN,
    MESH_HDR_LEN, OFF_PAYLOAD_LEN, OFF_SEQ, OFF_SESSION_ID, OFF_TAG, SESSION_ID_LEN, UDP_HDR_LEN,
};
use crate::session::SessionId;

/// IPv4 fragment offset mask (low 13 bits of flags+offset).
const IPV4_FRAG_OFFSET_MASK: u16 = 0x1FFF;

/// Result of classifying a raw frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classified {
    /// Not addressed to the mesh port; pass through unchanged.
    NotMesh,
    /// A structurally valid mesh frame.
    Mesh(MeshHeader),
}

/// Parsed mesh header.
///
/// Wire format (30 bytes, after the UDP header):
/// ```text
/// [session_id:16][seq:4 BE][mac_tag:8 BE][payload_len:2 BE]
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshHeader {
    /// Session the frame claims to belong to.
    pub session_id: SessionId,
    /// Per-session packet sequence number.
    pub seq: u32,
    /// Authentication tag carried on the wire.
    pub tag: u64,
    /// Byte range of the payload within the original frame.
    pub payload: Range<usize>,
}

impl MeshHeader {
    /// Declared payload length.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the payload slice from the original frame.
    ///
    /// `frame` must be the buffer this header was classified from.
    pub fn payload<'a>(&self, frame: &'a [u8]) -> &'a [u8] {
        frame.get(self.payload.clone()).unwrap_or(&[])
    }
}

/// Classify a raw link-layer frame.
///
/// Returns `Ok(Classified::NotMesh)` for anything that is not IPv4/UDP to
/// `mesh_port`, including frames too short to tell. Once the destination
/// port matches, truncation and length violations are errors.
pub fn classify(frame: &[u8], mesh_port: u16) -> Result<Classified, ProtocolError> {
    // Link layer
    if frame.len() < ETH_HDR_LEN {
        return Ok(Classified::NotMesh);
    }
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    if ethertype != ETH_P_IPV4 {
        return Ok(Classified::NotMesh);
    }

    // IPv4
    let ip = ETH_HDR_LEN;
    if frame.len() < ip + IPV4_MIN_HDR_LEN {
        return Ok(Classified::NotMesh);
    }
    let version = frame[ip] >> 4;
    let ihl = ((frame[ip] & 0x0F) as usize) * 4;
    if version != 4 || ihl < IPV4_MIN_HDR_LEN {
        return Ok(Classified::NotMesh);
    }
    if frame[ip + 9] != IPPROTO_UDP {
        return Ok(Classified::NotMesh);
    }
    // Only the first fragment carries the UDP header.
    let frag = u16::from_be_bytes([frame[ip + 6], frame[ip + 7]]);
    if frag & IPV4_FRAG_OFFSET_MASK != 0 {
        return Ok(Classified::NotMesh);
    }

    // UDP
    let udp = ip + ihl;
    if frame.len() < udp + UDP_HDR_LEN {
        return Ok(Classified::NotMesh);
    }
    let dst_port = u16::from_be_bytes([frame[udp + 2], frame[udp + 3]]);
    if dst_port != mesh_port {
        return Ok(Classified::NotMesh);
    }

    // Mesh header: from here on the frame is ours and must be well formed.
    let mesh = udp + UDP_HDR_LEN;
    let available = frame.len() - mesh;
    if available < MESH_HDR_LEN {
        return Err(ProtocolError::TruncatedHeader {
            expected: MESH_HDR_LEN,
            got: available,
        });
    }
    let hdr = &frame[mesh..mesh + MESH_HDR_LEN];

    let mut id = [0u8; SESSION_ID_LEN];
    id.copy_from_slice(&hdr[OFF_SESSION_ID..OFF_SESSION_ID + SESSION_ID_LEN]);
    let seq = u32::from_be_bytes([hdr[OFF_SEQ], hdr[OFF_SEQ + 1], hdr[OFF_SEQ + 2], hdr[OFF_SEQ + 3]]);
    let tag = u64::from_be_bytes([
        hdr[OFF_TAG], hdr[OFF_TAG + 1], hdr[OFF_TAG + 2], hdr[OFF_TAG + 3],
        hdr[OFF_TAG + 4], hdr[OFF_TAG + 5], hdr[OFF_TAG + 6], hdr[OFF_TAG + 7],
    ]);
    let payload_len = u16::from_be_bytes([hdr[OFF_PAYLOAD_LEN], hdr[OFF_PAYLOAD_LEN + 1]]) as usize;

    if payload_len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLong {
            max: MAX_PAYLOAD_LEN,
            got: payload_len,
        });
    }

    let start = mesh + MESH_HDR_LEN;
    let end = start + payload_len;
    if end > frame.len() {
        return Err(ProtocolError::PayloadPastEnd {
            needed: end,
            available: frame.len(),
        });
    }

    Ok(Classified::Mesh(MeshHeader {
        session_id: SessionId::from_bytes(id),
        seq,
        tag,
        payload: start..end,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FrameBuilder, DEFAULT_MESH_PORT};
    use crate::session::MacKey;

    fn sid(val: u8) -> SessionId {
        SessionId::from_bytes([val; 16])
    }

    fn build(payload: &[u8]) -> Vec<u8> {
        FrameBuilder::new(sid(7), MacKey::from_bytes([1; 16]))
            .build(42, payload)
            .unwrap()
    }

    /// Offset of the mesh header in frames produced by the builder.
    const MESH_OFF: usize = 14 + 20 + 8;

    #[test]
    fn test_classify_valid_frame() {
        let frame = build(b"hello");
        let header = match classify(&frame, DEFAULT_MESH_PORT).unwrap() {
            Classified::Mesh(h) => h,
            other => panic!("expected mesh frame, got {:?}", other),
        };

        assert_eq!(header.session_id, sid(7));
        assert_eq!(header.seq, 42);
        assert_eq!(header.payload_len(), 5);
        assert_eq!(header.payload(&frame), b"hello");
    }

    #[test]
    fn test_classify_empty_payload() {
        let frame = build(&[]);
        match classify(&frame, DEFAULT_MESH_PORT).unwrap() {
            Classified::Mesh(h) => assert_eq!(h.payload_len(), 0),
            other => panic!("expected mesh frame, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_short_frames_pass_through() {
        let frame = build(b"x");
        // Anything cut before the UDP destination port is readable is not ours.
        for len in [0, 5, 13, 14, 33, 34, 37] {
            assert_eq!(
                classify(&frame[..len], DEFAULT_MESH_PORT).unwrap(),
                Classified::NotMesh,
                "len {}",
                len
            );
        }
    }

    #[test]
    fn test_classify_non_ipv4() {
        let mut frame = build(b"x");
        frame[12..14].copy_from_slice(&0x86DDu16.to_be_bytes());
        assert_eq!(classify(&frame, DEFAULT_MESH_PORT).unwrap(), Classified::NotMesh);
    }

    #[test]
    fn test_classify_non_udp() {
        let mut frame = build(b"x");
        frame[14 + 9] = 6; // TCP
        assert_eq!(classify(&frame, DEFAULT_MESH_PORT).unwrap(), Classified::NotMesh);
    }

    #[test]
    fn test_classify_other_port() {
        let frame = build(b"x");
        assert_eq!(classify(&frame, 443).unwrap(), Classified::NotMesh);
    }

    #[test]
    fn test_classify_bad_ihl() {
        let mut frame = build(b"x");
        frame[14] = 0x44;
        assert_eq!(classify(&frame, DEFAULT_MESH_PORT).unwrap(), Classified::NotMesh);
    }

    #[test]
    fn test_classify_non_first_fragment() {
        let mut frame = build(b"x");
        frame[14 + 6..14 + 8].copy_from_slice(&0x0010u16.to_be_bytes());
        assert_eq!(classify(&frame, DEFAULT_MESH_PORT).unwrap(), Classified::NotMesh);
    }

    #[test]
    fn test_classify_honours_ip_options() {
        let frame = build(b"opt");
        // Re-assemble with a 24-byte IPv4 header (one 4-byte option).
        let mut with_opts = Vec::new();
        with_opts.extend_from_slice(&frame[..14]);
        with_opts.push(0x46);
        with_opts.extend_from_slice(&frame[15..34]);
        with_opts.extend_from_slice(&[1, 1, 1, 0]);
        with_opts.extend_from_slice(&frame[34..]);

        match classify(&with_opts, DEFAULT_MESH_PORT).unwrap() {
            Classified::Mesh(h) => assert_eq!(h.payload(&with_opts), b"opt"),
            other => panic!("expected mesh frame, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_truncated_mesh_header() {
        let frame = build(&[]);
        let cut = &frame[..MESH_OFF + 10];
        assert_eq!(
            classify(cut, DEFAULT_MESH_PORT),
            Err(ProtocolError::TruncatedHeader { expected: 30, got: 10 })
        );
    }

    #[test]
    fn test_classify_payload_past_end() {
        let frame = build(&[0xAB; 100]);
        let cut = &frame[..frame.len() - 1];
        assert!(matches!(
            classify(cut, DEFAULT_MESH_PORT),
            Err(ProtocolError::PayloadPastEnd { .. })
        ));
    }

    #[test]
    fn test_classify_payload_length_boundary() {
        let frame = build(&[0u8; MAX_PAYLOAD_LEN]);
        assert!(matches!(
            classify(&frame, DEFAULT_MESH_PORT),
            Ok(Classified::Mesh(_))
        ));

        // Declare one byte more than allowed, with enough bytes present.
        let mut over = frame.clone();
        over.push(0);
        let len_off = MESH_OFF + OFF_PAYLOAD_LEN;
        over[len_off..len_off + 2].copy_from_slice(&((MAX_PAYLOAD_LEN + 1) as u16).to_be_bytes());
        assert_eq!(
            classify(&over, DEFAULT_MESH_PORT),
            Err(ProtocolError::PayloadTooLong { max: 1400, got: 1401 })
        );
    }

    #[test]
    fn test_classify_ignores_trailing_padding() {
        let mut frame = build(b"ab");
        frame.extend_from_slice(&[0; 16]);
        match classify(&frame, DEFAULT_MESH_PORT).unwrap() {
            Classified::Mesh(h) => assert_eq!(h.payload(&frame), b"ab"),
            other => panic!("expected mesh frame, got {:?}", other),
        }
    }
}
