//! Error types for frame parsing and reassembly.

use thiserror::Error;

/// Errors produced while parsing or constructing wire data.
///
/// Routers treat all of these as "skip the frame" — parser errors are
/// never echoed back onto the network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is shorter than the fixed header.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum number of bytes required
        expected: usize,
        /// Number of bytes available
        actual: usize,
    },

    /// Header length field disagrees with the buffer.
    #[error("frame truncated: header claims {claimed} bytes, buffer has {actual}")]
    FrameTruncated {
        /// Total frame size claimed by the header
        claimed: usize,
        /// Number of bytes available
        actual: usize,
    },

    /// Header length field is below the header size or above the frame cap.
    #[error("invalid frame length {0}")]
    InvalidLength(u32),

    /// Payload exceeds the per-frame cap.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Offending payload size
        size: usize,
        /// Maximum allowed payload size
        max: usize,
    },

    /// Logical transaction size exceeds the reassembly cap.
    #[error("transaction too large: {size} bytes (max {max})")]
    TransactionTooLarge {
        /// Claimed total size
        size: usize,
        /// Maximum allowed total size
        max: usize,
    },

    /// A fragment does not fit inside the declared total size.
    #[error("fragment out of bounds: offset {offset} + len {len} > total {total}")]
    FragmentOutOfBounds {
        /// Fragment offset within the transaction
        offset: usize,
        /// Fragment length
        len: usize,
        /// Declared transaction total size
        total: usize,
    },

    /// Router read request is shorter than the fixed 48-byte layout.
    #[error("read request too short: expected {expected} bytes, got {actual}")]
    ReadRequestTooShort {
        /// Required request size
        expected: usize,
        /// Number of bytes received
        actual: usize,
    },
}
