//! Frame type combining header and payload, plus blob-walking helpers.
//!
//! On the wire a frame is `[header: 128 bytes] + [payload: ≤16 KiB]`.
//! Routers and peers exchange *concatenations* of frames; the 4-byte
//! length prefix at the start of every header is what lets a receiver
//! walk the blob without any out-of-band framing.

use bytes::{BufMut, Bytes};

use crate::{
    error::ProtocolError,
    header::{Address, FrameHeader, FrameType, MAX_FRAME_PAYLOAD},
};

/// Complete protocol frame.
///
/// # Invariants
///
/// - `payload.len() == header.length() - 128` (enforced by
///   [`Frame::new`] and verified by [`Frame::decode`])
/// - `payload.len() <= MAX_FRAME_PAYLOAD`
///
/// Structural validity only: the payload may be ciphertext, and nothing
/// in the header is authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (128 bytes).
    pub header: FrameHeader,
    /// Raw payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, stamping the header length from the payload.
    ///
    /// The payload must not exceed [`MAX_FRAME_PAYLOAD`]; oversized
    /// logical payloads go through [`split_into_frames`] instead.
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        let payload = payload.into();
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }
        header.set_length((FrameHeader::SIZE + payload.len()) as u32);
        Ok(Self { header, payload })
    }

    /// Serialized size: header plus payload.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Append the wire encoding to `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        debug_assert_eq!(self.header.length() as usize, self.encoded_len());
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);
    }

    /// Wire encoding as an owned buffer.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf
    }

    /// Decode a frame from the start of `bytes`.
    ///
    /// Only `header.length()` bytes are consumed; trailing data is
    /// ignored so callers can walk concatenated frames.
    ///
    /// # Errors
    ///
    /// Propagates header validation errors and returns
    /// [`ProtocolError::FrameTruncated`] when the buffer holds fewer
    /// bytes than the header claims.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let header = *FrameHeader::from_bytes(bytes)?;
        let total = header.length() as usize;

        if bytes.len() < total {
            return Err(ProtocolError::FrameTruncated { claimed: total, actual: bytes.len() });
        }

        let payload = Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..total]);
        Ok(Self { header, payload })
    }
}

/// Iterator over raw frame slices inside a concatenated blob.
///
/// Follows the router's failure model: a malformed tail (short header,
/// bad length field, truncated payload) silently ends iteration. The
/// yielded slices are exactly one frame each and have already passed
/// header length validation.
#[derive(Debug)]
pub struct FrameSlices<'a> {
    blob: &'a [u8],
    pos: usize,
}

impl<'a> FrameSlices<'a> {
    /// Walk `blob` from the beginning.
    #[must_use]
    pub fn new(blob: &'a [u8]) -> Self {
        Self { blob, pos: 0 }
    }
}

impl<'a> Iterator for FrameSlices<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.blob[self.pos..];
        let header = FrameHeader::from_bytes(rest).ok()?;
        let total = header.length() as usize;
        if rest.len() < total {
            return None;
        }
        self.pos += total;
        Some(&rest[..total])
    }
}

/// Fragment a logical payload into call frames.
///
/// Every frame shares `(frame_type, src, dst, transaction_id,
/// session_id, comment)` and carries its own `(offset, total_size)` so
/// the receiver can reassemble in any order. A zero-byte payload yields
/// exactly one frame — an empty call is still a call.
#[must_use]
pub fn split_into_frames(
    frame_type: FrameType,
    src: &Address,
    dst: &Address,
    transaction_id: u64,
    session_id: u64,
    comment: &str,
    payload: &[u8],
) -> Vec<Frame> {
    let total_size = payload.len() as u32;
    let mut frames = Vec::with_capacity(payload.len().div_ceil(MAX_FRAME_PAYLOAD).max(1));

    let mut offset = 0usize;
    loop {
        let chunk_len = (payload.len() - offset).min(MAX_FRAME_PAYLOAD);

        let mut header = FrameHeader::new(frame_type);
        header.set_transaction_id(transaction_id);
        header.set_session_id(session_id);
        header.set_offset(offset as u32);
        header.set_total_size(total_size);
        header.set_src_address(src);
        header.set_dst_address(dst);
        header.set_comment(comment);

        let chunk = Bytes::copy_from_slice(&payload[offset..offset + chunk_len]);

        // INVARIANT: chunk_len <= MAX_FRAME_PAYLOAD, so Frame::new cannot fail.
        if let Ok(frame) = Frame::new(header, chunk) {
            frames.push(frame);
        }

        offset += chunk_len;
        if offset >= payload.len() {
            break;
        }
    }

    frames
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn addr(b: u8) -> Address {
        [b; 32]
    }

    fn frame_with_payload(payload: &[u8]) -> Frame {
        let mut header = FrameHeader::new(FrameType::CallRequest);
        header.set_src_address(&addr(1));
        header.set_dst_address(&addr(2));
        Frame::new(header, payload.to_vec()).unwrap()
    }

    #[test]
    fn encode_decode_round_trip() {
        let frame = frame_with_payload(&[1, 2, 3, 4]);
        let wire = frame.to_vec();
        let parsed = Frame::decode(&wire).unwrap();
        assert_eq!(frame, parsed);
        assert_eq!(parsed.header.length(), 132);
    }

    #[test]
    fn reject_truncated_payload() {
        let frame = frame_with_payload(&[0u8; 100]);
        let wire = frame.to_vec();
        let result = Frame::decode(&wire[..150]);
        assert!(matches!(result, Err(ProtocolError::FrameTruncated { .. })));
    }

    #[test]
    fn reject_oversized_payload() {
        let header = FrameHeader::new(FrameType::CallRequest);
        let result = Frame::new(header, vec![0u8; MAX_FRAME_PAYLOAD + 1]);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { .. })));
    }

    #[test]
    fn walk_concatenated_frames() {
        let mut blob = Vec::new();
        frame_with_payload(b"one").encode(&mut blob);
        frame_with_payload(b"two-two").encode(&mut blob);
        frame_with_payload(b"").encode(&mut blob);

        let slices: Vec<_> = FrameSlices::new(&blob).collect();
        assert_eq!(slices.len(), 3);
        assert_eq!(Frame::decode(slices[1]).unwrap().payload.as_ref(), b"two-two");
    }

    #[test]
    fn walk_stops_at_malformed_tail() {
        let mut blob = frame_with_payload(b"good").to_vec();
        blob.extend_from_slice(&[0xFF; 40]); // short garbage tail

        let slices: Vec<_> = FrameSlices::new(&blob).collect();
        assert_eq!(slices.len(), 1);
    }

    #[test]
    fn walk_stops_at_bad_length_field() {
        let mut blob = frame_with_payload(b"good").to_vec();
        let mut bad = frame_with_payload(b"bad").to_vec();
        bad[0..4].copy_from_slice(&12u32.to_le_bytes()); // below header size
        blob.extend_from_slice(&bad);

        let slices: Vec<_> = FrameSlices::new(&blob).collect();
        assert_eq!(slices.len(), 1);
    }

    #[test]
    fn split_empty_payload_yields_one_frame() {
        let frames = split_into_frames(
            FrameType::CallRequest,
            &addr(1),
            &addr(2),
            7,
            0,
            "ping",
            &[],
        );
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.total_size(), 0);
        assert!(frames[0].payload.is_empty());
        assert_eq!(frames[0].header.comment(), "ping");
    }

    #[test]
    fn split_fragment_count_matches_ceil_division() {
        let payload = vec![0xAB; 10_000_000];
        let frames = split_into_frames(
            FrameType::CallResponse,
            &addr(1),
            &addr(2),
            1,
            3,
            "blob",
            &payload,
        );
        assert_eq!(frames.len(), 10_000_000usize.div_ceil(MAX_FRAME_PAYLOAD));
        assert_eq!(frames.len(), 611);
    }

    proptest! {
        #[test]
        fn split_preserves_bytes(payload in prop::collection::vec(any::<u8>(), 0..100_000)) {
            let frames = split_into_frames(
                FrameType::CallRequest,
                &addr(1),
                &addr(2),
                42,
                9,
                "prop",
                &payload,
            );

            let mut rebuilt = vec![0u8; payload.len()];
            for frame in &frames {
                let offset = frame.header.offset() as usize;
                rebuilt[offset..offset + frame.payload.len()].copy_from_slice(&frame.payload);
                prop_assert_eq!(frame.header.total_size() as usize, payload.len());
            }
            prop_assert_eq!(rebuilt, payload);
        }
    }
}
