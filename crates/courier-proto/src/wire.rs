//! Router read-request and read-response wire formats.
//!
//! A read is a 48-byte request `(after_id u64 LE | max_bytes u64 LE |
//! src_address[32])`; the response is `(last_id u64 LE | concatenated
//! frames)`. The `last_id` is an opaque cursor — clients feed it back
//! verbatim on the next read.

use crate::{
    error::ProtocolError,
    header::{ADDRESS_SIZE, Address},
};

/// Fixed size of the read request body.
pub const READ_REQUEST_SIZE: usize = 8 + 8 + ADDRESS_SIZE;

/// A long-poll read request addressed to a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Return frames with id strictly greater than this cursor.
    pub after_id: u64,
    /// Byte budget for the concatenated response frames.
    pub max_bytes: u64,
    /// Mailbox owner — the reading peer's own address.
    pub src_address: Address,
}

impl ReadRequest {
    /// Encode into the 48-byte wire layout.
    #[must_use]
    pub fn encode(&self) -> [u8; READ_REQUEST_SIZE] {
        let mut buf = [0u8; READ_REQUEST_SIZE];
        buf[0..8].copy_from_slice(&self.after_id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.max_bytes.to_le_bytes());
        buf[16..].copy_from_slice(&self.src_address);
        buf
    }

    /// Decode from a request body.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::ReadRequestTooShort`] if fewer than 48 bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < READ_REQUEST_SIZE {
            return Err(ProtocolError::ReadRequestTooShort {
                expected: READ_REQUEST_SIZE,
                actual: bytes.len(),
            });
        }

        let mut after_id = [0u8; 8];
        after_id.copy_from_slice(&bytes[0..8]);
        let mut max_bytes = [0u8; 8];
        max_bytes.copy_from_slice(&bytes[8..16]);
        let mut src_address = [0u8; ADDRESS_SIZE];
        src_address.copy_from_slice(&bytes[16..READ_REQUEST_SIZE]);

        Ok(Self {
            after_id: u64::from_le_bytes(after_id),
            max_bytes: u64::from_le_bytes(max_bytes),
            src_address,
        })
    }
}

/// Helpers for the read response `(last_id u64 LE | frames)`.
pub mod read_response {
    /// Prepend the cursor to a frames blob.
    #[must_use]
    pub fn encode(last_id: u64, frames: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + frames.len());
        buf.extend_from_slice(&last_id.to_le_bytes());
        buf.extend_from_slice(frames);
        buf
    }

    /// Split a response into `(last_id, frames)`. `None` when the body
    /// is too short to carry a cursor.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<(u64, &[u8])> {
        if bytes.len() < 8 {
            return None;
        }
        let mut id = [0u8; 8];
        id.copy_from_slice(&bytes[0..8]);
        Some((u64::from_le_bytes(id), &bytes[8..]))
    }
}
