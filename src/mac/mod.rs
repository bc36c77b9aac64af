//! Keyed MAC for the fast path.
//!
//! SipHash-2-4 over a byte range with a 128-bit key and a 64-bit output.
//! Input is processed in 8-byte blocks (2 compression rounds each) followed
//! by a length-padded final block and 4 finalization rounds.
//!
//! ## Block cap
//!
//! The number of blocks processed per call is capped at `MAC_MAX_BLOCKS`
//! so that every call does a statically bounded amount of work. Inputs
//! longer than `MAC_MAX_INPUT` are rejected with `MacError::InputTooLong`;
//! they are never partially processed. The mesh payload maximum sits below
//! the cap, so a structurally valid payload is always covered in full.
//!
//! ## Packet tags
//!
//! A packet tag is the MAC over `session_id || seq` (seq in network byte
//! order), XORed with the MAC over the payload when the payload is
//! non-empty. The fixed-size header is therefore authenticated even for
//! zero-length payloads.

use thiserror::Error;

use crate::protocol::{MAX_PAYLOAD_LEN, SEQ_LEN, SESSION_ID_LEN};
use crate::session::{MacKey, SessionId};


/// Size of one compression block.
pub const MAC_BLOCK_LEN: usize = 8;

/// Maximum number of full blocks processed per MAC call.
pub const MAC_MAX_BLOCKS: usize = 256;

/// Longest input accepted by `siphash24`.
pub const MAC_MAX_INPUT: usize = MAC_MAX_BLOCKS * MAC_BLOCK_LEN; // 2048

/// Length of the authenticated header message (session_id || seq).
pub const HEADER_MESSAGE_LEN: usize = SESSION_ID_LEN + SEQ_LEN;

const _: () = assert!(MAX_PAYLOAD_LEN <= MAC_MAX_INPUT);

/// Errors from MAC computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacError {
    #[error("mac input too long: max {max}, got {got}")]
    InputTooLong { max: usize, got: usize },
}

/// SipHash internal state.
struct SipState {
    v0: u64,
    v1: u64,
    v2: u64,
    v3: u64,
}

impl SipState {
    fn new(key: &MacKey) -> Self {
        let k = key.as_bytes();
        let k0 = u64::from_le_bytes([k[0], k[1], k[2], k[3], k[4], k[5], k[6], k[7]]);
        let k1 = u64::from_le_bytes([k[8], k[9], k[10], k[11], k[12], k[13], k[14], k[15]]);
        Self {
            v0: k0 ^ 0x736f_6d65_7073_6575,
            v1: k1 ^ 0x646f_7261_6e64_6f6d,
            v2: k0 ^ 0x6c79_6765_6e65_7261,
            v3: k1 ^ 0x7465_6462_7974_6573,
        }
    }

    #[inline(always)]
    fn round(&mut self) {
        self.v0 = self.v0.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(13);
        self.v1 ^= self.v0;
        self.v0 = self.v0.rotate_left(32);
        self.v2 = self.v2.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(16);
        self.v3 ^= self.v2;
        self.v0 = self.v0.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(21);
        self.v3 ^= self.v0;
        self.v2 = self.v2.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(17);
        self.v1 ^= self.v2;
        self.v2 = self.v2.rotate_left(32);
    }

    #[inline(always)]
    fn compress(&mut self, m: u64) {
        self.v3 ^= m;
        self.round();
        self.round();
        self.v0 ^= m;
    }

    fn finish(mut self) -> u64 {
        self.v2 ^= 0xff;
        self.round();
        self.round();
        self.round();
        self.round();
        self.v0 ^ self.v1 ^ self.v2 ^ self.v3
    }
}

/// SipHash-2-4 of `msg` under `key`.
///
/// Fails if `msg` is longer than `MAC_MAX_INPUT`.
pub fn siphash24(key: &MacKey, msg: &[u8]) -> Result<u64, MacError> {
    if msg.len() > MAC_MAX_INPUT {
        return Err(MacError::InputTooLong {
            max: MAC_MAX_INPUT,
            got: msg.len(),
        });
    }

    let mut state = SipState::new(key);

    let blocks = msg.chunks_exact(MAC_BLOCK_LEN);
    let tail = blocks.remainder();
    for block in blocks.take(MAC_MAX_BLOCKS) {
        let m = u64::from_le_bytes([
            block[0], block[1], block[2], block[3], block[4], block[5], block[6], block[7],
        ]);
        state.compress(m);
    }

    // Final block: remaining bytes, length in the top byte.
    let mut last = (msg.len() as u64 & 0xff) << 56;
    for (i, byte) in tail.iter().enumerate() {
        last |= (*byte as u64) << (8 * i);
    }
    state.compress(last);

    Ok(state.finish())
}

/// Compute the authentication tag for a mesh packet.
pub fn packet_tag(
    key: &MacKey,
    session_id: &SessionId,
    seq: u32,
    payload: &[u8],
) -> Result<u64, MacError> {
    let mut header = [0u8; HEADER_MESSAGE_LEN];
    header[..SESSION_ID_LEN].copy_from_slice(session_id.as_bytes());
    header[SESSION_ID_LEN..].copy_from_slice(&seq.to_be_bytes());

    let mut tag = siphash24(key, &header)?;
    if !payload.is_empty() {
        tag ^= siphash24(key, payload)?;
    }
    Ok(tag)
}

/// Compare two tags without an early exit on the first differing byte.
#[inline]
pub fn tags_equal(a: u64, b: u64) -> bool {
    let diff = a ^ b;
    // Fold to a single bit before comparing.
    let folded = (diff | diff.wrapping_neg()) >> 63;
    folded == 0
}
