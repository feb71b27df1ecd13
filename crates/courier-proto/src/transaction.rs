//! Transaction reassembly.
//!
//! A logical call leg (request or response) may arrive as many frames
//! in any order. A [`Transaction`] collects fragments keyed by offset
//! until their combined length equals the declared total size, then
//! assembles the result buffer. The sender keeps a mirror transaction
//! whose completion flag it polls; there is no per-fragment ack.

use std::time::Instant;

use bytes::Bytes;

use crate::{
    error::ProtocolError,
    header::{Address, FrameType},
};

/// Largest logical payload a transaction will reassemble.
///
/// Guards the receiver against a forged `total_size` causing a huge
/// allocation from a single small frame.
pub const MAX_TRANSACTION_SIZE: usize = 100 * 1024 * 1024;

/// Most fragments a single transaction will track.
const MAX_FRAGMENTS: usize = 1000 + MAX_TRANSACTION_SIZE / crate::MAX_FRAME_PAYLOAD;

/// Identifies an incoming transaction: one caller may run several
/// concurrent transactions, and several callers may share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    /// Sender address from the frame header.
    pub src_address: Address,
    /// Caller-assigned transaction id.
    pub transaction_id: u64,
}

/// Reassembly state for one logical call leg.
#[derive(Debug)]
pub struct Transaction {
    /// Request or response.
    pub frame_type: FrameType,
    /// Originating peer address.
    pub src_address: Address,
    /// Destination peer address.
    pub dst_address: Address,
    /// Caller-assigned transaction id.
    pub transaction_id: u64,
    /// Session the call is bound to (0 during establishment).
    pub session_id: u64,
    /// Declared logical payload size.
    pub total_size: u32,
    /// When the first fragment arrived; used for garbage collection.
    pub begin: Instant,

    fragments: Vec<(u32, Bytes)>,
    received: usize,

    /// Set once `result` holds the complete payload or `error` is set.
    pub complete: bool,
    /// Assembled payload, valid when `complete && error.is_none()`.
    pub result: Vec<u8>,
    /// Terminal error reported instead of a payload.
    pub error: Option<String>,
}

impl Transaction {
    /// Start reassembly for a transaction with the given identity.
    #[must_use]
    pub fn new(
        frame_type: FrameType,
        src_address: Address,
        dst_address: Address,
        transaction_id: u64,
        session_id: u64,
        total_size: u32,
    ) -> Self {
        Self {
            frame_type,
            src_address,
            dst_address,
            transaction_id,
            session_id,
            total_size,
            begin: Instant::now(),
            fragments: Vec::new(),
            received: 0,
            complete: false,
            result: Vec::new(),
            error: None,
        }
    }

    /// Bytes received so far across unique fragments.
    #[must_use]
    pub fn received_len(&self) -> usize {
        self.received
    }

    /// Feed one fragment.
    ///
    /// Duplicate offsets are ignored (a router may replay a frame after
    /// a cursor regression). When the unique fragments cover the total
    /// size, the result buffer is assembled and `complete` is set.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::TransactionTooLarge`] if `total_size` exceeds
    ///   [`MAX_TRANSACTION_SIZE`]
    /// - [`ProtocolError::FragmentOutOfBounds`] if the fragment does not
    ///   fit inside `total_size`
    pub fn append_fragment(&mut self, offset: u32, data: Bytes) -> Result<(), ProtocolError> {
        let total = self.total_size as usize;
        if total > MAX_TRANSACTION_SIZE {
            return Err(ProtocolError::TransactionTooLarge {
                size: total,
                max: MAX_TRANSACTION_SIZE,
            });
        }

        let offset_usize = offset as usize;
        if offset_usize + data.len() > total {
            return Err(ProtocolError::FragmentOutOfBounds {
                offset: offset_usize,
                len: data.len(),
                total,
            });
        }

        if self.complete || self.fragments.len() >= MAX_FRAGMENTS {
            return Ok(());
        }
        if self.fragments.iter().any(|(o, _)| *o == offset) {
            return Ok(());
        }

        self.received += data.len();
        self.fragments.push((offset, data));

        if self.received == total {
            self.assemble();
        }

        Ok(())
    }

    /// Mark the transaction failed; completion wakes the waiter.
    pub fn fail(&mut self, error: String) {
        self.error = Some(error);
        self.complete = true;
    }

    fn assemble(&mut self) {
        self.result = vec![0u8; self.total_size as usize];
        for (offset, data) in &self.fragments {
            let start = *offset as usize;
            self.result[start..start + data.len()].copy_from_slice(data);
        }
        self.fragments.clear();
        self.complete = true;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn tx(total_size: u32) -> Transaction {
        Transaction::new(FrameType::CallRequest, [1; 32], [2; 32], 1, 0, total_size)
    }

    #[test]
    fn single_fragment_completes() {
        let mut t = tx(5);
        t.append_fragment(0, Bytes::from_static(b"hello")).unwrap();
        assert!(t.complete);
        assert_eq!(t.result, b"hello");
    }

    #[test]
    fn zero_byte_transaction_completes_on_empty_fragment() {
        let mut t = tx(0);
        t.append_fragment(0, Bytes::new()).unwrap();
        assert!(t.complete);
        assert!(t.result.is_empty());
    }

    #[test]
    fn out_of_order_fragments() {
        let mut t = tx(10);
        t.append_fragment(5, Bytes::from_static(b"world")).unwrap();
        assert!(!t.complete);
        t.append_fragment(0, Bytes::from_static(b"hello")).unwrap();
        assert!(t.complete);
        assert_eq!(t.result, b"helloworld");
    }

    #[test]
    fn duplicate_offset_is_ignored() {
        let mut t = tx(10);
        t.append_fragment(0, Bytes::from_static(b"hello")).unwrap();
        t.append_fragment(0, Bytes::from_static(b"hello")).unwrap();
        assert!(!t.complete);
        assert_eq!(t.received_len(), 5);
    }

    #[test]
    fn oversized_total_rejected() {
        let mut t = tx((MAX_TRANSACTION_SIZE + 1) as u32);
        let err = t.append_fragment(0, Bytes::from_static(b"x")).unwrap_err();
        assert!(matches!(err, ProtocolError::TransactionTooLarge { .. }));
    }

    #[test]
    fn fragment_past_total_rejected() {
        let mut t = tx(4);
        let err = t.append_fragment(2, Bytes::from_static(b"abc")).unwrap_err();
        assert!(matches!(err, ProtocolError::FragmentOutOfBounds { .. }));
    }

    #[test]
    fn fail_sets_completion() {
        let mut t = tx(100);
        t.fail("#DECR".to_string());
        assert!(t.complete);
        assert_eq!(t.error.as_deref(), Some("#DECR"));
    }

    proptest! {
        #[test]
        fn reassembly_is_order_independent(
            payload in prop::collection::vec(any::<u8>(), 1..50_000),
            seed in any::<u64>(),
        ) {
            let chunk = 4096usize;
            let mut order: Vec<usize> = (0..payload.len().div_ceil(chunk)).collect();

            // Cheap deterministic shuffle
            let mut state = seed | 1;
            for i in (1..order.len()).rev() {
                state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                order.swap(i, (state as usize) % (i + 1));
            }

            let mut t = tx(payload.len() as u32);
            for idx in order {
                let start = idx * chunk;
                let end = (start + chunk).min(payload.len());
                t.append_fragment(
                    start as u32,
                    Bytes::copy_from_slice(&payload[start..end]),
                ).unwrap();
            }

            prop_assert!(t.complete);
            prop_assert_eq!(t.result, payload);
        }
    }
}
