//! Protocol error types.

use thiserror::Error;

use crate::mac::MacError;

/// Structural violations in a frame already identified as mesh traffic.
///
/// The parsing variants map to a `Malformed` rejection in the fast path;
/// the remaining ones are only produced when building frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("mesh header truncated: expected at least {expected}, got {got}")]
    TruncatedHeader { expected: usize, got: usize },

    #[error("payload too long: max {max}, got {got}")]
    PayloadTooLong { max: usize, got: usize },

    #[error("payload extends past frame end: need {needed}, have {available}")]
    PayloadPastEnd { needed: usize, available: usize },

    #[error("frame too large to build: {0} bytes")]
    FrameTooLarge(usize),

    #[error("tag computation failed: {0}")]
    Mac(#[from] MacError),
}
