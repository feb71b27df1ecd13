//! Frame header implementation with zero-copy parsing.
//!
//! The [`FrameHeader`] is a fixed 128-byte structure serialized as raw
//! binary (little endian). A router can pull the destination address out
//! of an untrusted buffer without deserializing anything else, and a
//! peer can route a fragment to its transaction from the first two cache
//! lines alone.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::ProtocolError;

/// Size of a peer address: a raw Ed25519 public key.
pub const ADDRESS_SIZE: usize = 32;

/// A peer address — the 32 bytes of its Ed25519 public key.
pub type Address = [u8; ADDRESS_SIZE];

/// Maximum payload carried by a single frame (fragments above this are
/// split by [`crate::split_into_frames`]).
pub const MAX_FRAME_PAYLOAD: usize = 16 * 1024;

/// Frame discriminator carried at byte 4 of the header.
///
/// Unknown values are not a parse error; dispatchers drop such frames
/// silently so future frame types can coexist with old peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// A fragment of a call request (caller → callee).
    CallRequest = 0x10,
    /// A fragment of a call response (callee → caller).
    CallResponse = 0x11,
    /// Ask a peer for its signed transport public key.
    GetPublicKeyRequest = 0x20,
    /// Reply carrying `transport_pub[32] || ed25519_sig[64]`.
    GetPublicKeyResponse = 0x21,
}

impl FrameType {
    /// Convert a raw header byte. `None` for unrecognized values.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x10 => Some(Self::CallRequest),
            0x11 => Some(Self::CallResponse),
            0x20 => Some(Self::GetPublicKeyRequest),
            0x21 => Some(Self::GetPublicKeyResponse),
            _ => None,
        }
    }

    /// The raw wire byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Fixed 128-byte frame header (little-endian byte order).
///
/// Fields are stored as raw byte arrays to avoid alignment issues; all
/// bit patterns are valid, so casting an untrusted buffer can never be
/// undefined behavior.
///
/// Layout:
///
/// | offset | size | field |
/// |---|---|---|
/// | 0 | 4 | total frame length including the header (u32 LE) |
/// | 4 | 1 | frame type |
/// | 5 | 8 | transaction id (u64 LE) |
/// | 13 | 8 | session id (u64 LE), 0 before auth |
/// | 21 | 4 | payload offset within the transaction (u32 LE) |
/// | 25 | 4 | logical transaction size (u32 LE) |
/// | 29 | 3 | reserved |
/// | 32 | 32 | source address |
/// | 64 | 32 | destination address |
/// | 96 | 32 | ASCII diagnostic comment |
///
/// # Security
///
/// Nothing in the header is authenticated. The `comment` field in
/// particular is a diagnostic tag and must never drive dispatch; session
/// binding is established by the encrypted payload, not by header
/// fields.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    length: [u8; 4],
    frame_type: u8,
    transaction_id: [u8; 8],
    session_id: [u8; 8],
    offset: [u8; 4],
    total_size: [u8; 4],
    reserved: [u8; 3],
    src_address: [u8; ADDRESS_SIZE],
    dst_address: [u8; ADDRESS_SIZE],
    comment: [u8; 32],
}

impl FrameHeader {
    /// Size of the serialized header (128 bytes).
    pub const SIZE: usize = 128;

    /// Byte range of the destination address within a raw frame —
    /// the only part of the header a router inspects.
    pub const DST_RANGE: std::ops::Range<usize> = 64..96;

    /// Create a header for the given frame type with all other fields
    /// zeroed. `length` is stamped when the frame is encoded.
    #[must_use]
    pub fn new(frame_type: FrameType) -> Self {
        let mut header = Self {
            length: [0; 4],
            frame_type: frame_type.to_u8(),
            transaction_id: [0; 8],
            session_id: [0; 8],
            offset: [0; 4],
            total_size: [0; 4],
            reserved: [0; 3],
            src_address: [0; ADDRESS_SIZE],
            dst_address: [0; ADDRESS_SIZE],
            comment: [0; 32],
        };
        header.length = (Self::SIZE as u32).to_le_bytes();
        header
    }

    /// Parse a header from untrusted bytes (zero-copy).
    ///
    /// Validates only structural properties: buffer size and the length
    /// field bounds. Unknown frame types pass through — dispatch decides
    /// what to do with them.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::FrameTooShort`] if the buffer holds fewer than
    ///   128 bytes
    /// - [`ProtocolError::InvalidLength`] if the length field is below
    ///   the header size or above header + [`MAX_FRAME_PAYLOAD`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self, ProtocolError> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        let length = header.length() as usize;
        if length < Self::SIZE || length > Self::SIZE + MAX_FRAME_PAYLOAD {
            return Err(ProtocolError::InvalidLength(header.length()));
        }

        Ok(header)
    }

    /// Serialize to a fixed byte array.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }

    /// Total frame length including the header.
    #[must_use]
    pub fn length(&self) -> u32 {
        u32::from_le_bytes(self.length)
    }

    /// Raw frame type byte.
    #[must_use]
    pub fn frame_type_raw(&self) -> u8 {
        self.frame_type
    }

    /// Frame type as enum. `None` if unrecognized.
    #[must_use]
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_u8(self.frame_type)
    }

    /// Caller-assigned transaction id, unique within one remote-peer
    /// relationship.
    #[must_use]
    pub fn transaction_id(&self) -> u64 {
        u64::from_le_bytes(self.transaction_id)
    }

    /// Session id; zero until a session is established.
    #[must_use]
    pub fn session_id(&self) -> u64 {
        u64::from_le_bytes(self.session_id)
    }

    /// Byte offset of this fragment within the logical transaction.
    #[must_use]
    pub fn offset(&self) -> u32 {
        u32::from_le_bytes(self.offset)
    }

    /// Logical transaction payload size.
    #[must_use]
    pub fn total_size(&self) -> u32 {
        u32::from_le_bytes(self.total_size)
    }

    /// Sender address (Ed25519 public key bytes).
    #[must_use]
    pub fn src_address(&self) -> &Address {
        &self.src_address
    }

    /// Receiver address (Ed25519 public key bytes).
    #[must_use]
    pub fn dst_address(&self) -> &Address {
        &self.dst_address
    }

    /// Diagnostic comment bytes, NUL-padded.
    #[must_use]
    pub fn comment_raw(&self) -> &[u8; 32] {
        &self.comment
    }

    /// Diagnostic comment up to the first NUL, lossy UTF-8.
    #[must_use]
    pub fn comment(&self) -> String {
        let end = self.comment.iter().position(|&b| b == 0).unwrap_or(32);
        String::from_utf8_lossy(&self.comment[..end]).into_owned()
    }

    /// Payload size derived from the length field. Saturates at zero
    /// for malformed headers.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        (self.length() as usize).saturating_sub(Self::SIZE)
    }

    /// Stamp the total frame length (header + payload).
    pub fn set_length(&mut self, length: u32) {
        self.length = length.to_le_bytes();
    }

    /// Set the transaction id.
    pub fn set_transaction_id(&mut self, id: u64) {
        self.transaction_id = id.to_le_bytes();
    }

    /// Set the session id.
    pub fn set_session_id(&mut self, id: u64) {
        self.session_id = id.to_le_bytes();
    }

    /// Set the fragment offset.
    pub fn set_offset(&mut self, offset: u32) {
        self.offset = offset.to_le_bytes();
    }

    /// Set the logical transaction size.
    pub fn set_total_size(&mut self, total_size: u32) {
        self.total_size = total_size.to_le_bytes();
    }

    /// Set the sender address.
    pub fn set_src_address(&mut self, address: &Address) {
        self.src_address = *address;
    }

    /// Set the receiver address.
    pub fn set_dst_address(&mut self, address: &Address) {
        self.dst_address = *address;
    }

    /// Stamp the diagnostic comment, truncated to 32 bytes.
    pub fn set_comment(&mut self, comment: &str) {
        let bytes = comment.as_bytes();
        let n = bytes.len().min(32);
        self.comment = [0; 32];
        self.comment[..n].copy_from_slice(&bytes[..n]);
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("length", &self.length())
            .field("frame_type", &format!("{:#04x}", self.frame_type_raw()))
            .field("transaction_id", &self.transaction_id())
            .field("session_id", &self.session_id())
            .field("offset", &self.offset())
            .field("total_size", &self.total_size())
            .field("comment", &self.comment())
            .finish_non_exhaustive()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn arbitrary_bytes<const N: usize>() -> impl Strategy<Value = [u8; N]> {
        prop::collection::vec(any::<u8>(), N).prop_map(|v| {
            let mut arr = [0u8; N];
            arr.copy_from_slice(&v);
            arr
        })
    }

    prop_compose! {
        fn arbitrary_header()(
            frame_type in prop_oneof![Just(0x10u8), Just(0x11), Just(0x20), Just(0x21)],
            transaction_id in any::<u64>(),
            session_id in any::<u64>(),
            offset in any::<u32>(),
            total_size in any::<u32>(),
            payload_len in 0..=MAX_FRAME_PAYLOAD,
            src in arbitrary_bytes::<32>(),
            dst in arbitrary_bytes::<32>(),
        ) -> FrameHeader {
            let mut header = FrameHeader::new(
                FrameType::from_u8(frame_type).unwrap(),
            );
            header.set_length((FrameHeader::SIZE + payload_len) as u32);
            header.set_transaction_id(transaction_id);
            header.set_session_id(session_id);
            header.set_offset(offset);
            header.set_total_size(total_size);
            header.set_src_address(&src);
            header.set_dst_address(&dst);
            header
        }
    }

    #[test]
    fn header_size() {
        assert_eq!(std::mem::size_of::<FrameHeader>(), FrameHeader::SIZE);
        assert_eq!(FrameHeader::SIZE, 128);
    }

    #[test]
    fn field_offsets_match_wire_layout() {
        let mut header = FrameHeader::new(FrameType::CallRequest);
        header.set_length(0x0403_0201);
        header.set_transaction_id(0x1122_3344_5566_7788);
        header.set_session_id(0xaabb_ccdd_eeff_0011);
        header.set_offset(0xdead_beef);
        header.set_total_size(0xcafe_babe);
        header.set_src_address(&[0x5a; 32]);
        header.set_dst_address(&[0xa5; 32]);
        header.set_comment("version");

        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], &0x0403_0201u32.to_le_bytes());
        assert_eq!(bytes[4], 0x10);
        assert_eq!(&bytes[5..13], &0x1122_3344_5566_7788u64.to_le_bytes());
        assert_eq!(&bytes[13..21], &0xaabb_ccdd_eeff_0011u64.to_le_bytes());
        assert_eq!(&bytes[21..25], &0xdead_beefu32.to_le_bytes());
        assert_eq!(&bytes[25..29], &0xcafe_babeu32.to_le_bytes());
        assert_eq!(&bytes[32..64], &[0x5a; 32]);
        assert_eq!(&bytes[64..96], &[0xa5; 32]);
        assert_eq!(&bytes[96..103], b"version");
    }

    #[test]
    fn reject_short_buffer() {
        let short = [0u8; 100];
        assert_eq!(
            FrameHeader::from_bytes(&short),
            Err(ProtocolError::FrameTooShort { expected: 128, actual: 100 })
        );
    }

    #[test]
    fn reject_undersized_length_field() {
        let mut buf = [0u8; 128];
        buf[0..4].copy_from_slice(&64u32.to_le_bytes());
        assert_eq!(FrameHeader::from_bytes(&buf), Err(ProtocolError::InvalidLength(64)));
    }

    #[test]
    fn reject_oversized_length_field() {
        let mut buf = [0u8; 128];
        let too_big = (FrameHeader::SIZE + MAX_FRAME_PAYLOAD + 1) as u32;
        buf[0..4].copy_from_slice(&too_big.to_le_bytes());
        assert_eq!(FrameHeader::from_bytes(&buf), Err(ProtocolError::InvalidLength(too_big)));
    }

    #[test]
    fn comment_truncates_to_32_bytes() {
        let mut header = FrameHeader::new(FrameType::CallRequest);
        header.set_comment(&"x".repeat(50));
        assert_eq!(header.comment().len(), 32);
    }

    proptest! {
        #[test]
        fn header_round_trip(header in arbitrary_header()) {
            let bytes = header.to_bytes();
            let parsed = FrameHeader::from_bytes(&bytes).expect("should parse");
            prop_assert_eq!(&header, parsed);
        }
    }
}
