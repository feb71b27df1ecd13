//! Cross-module wire properties: frames walked out of blobs must
//! reassemble to the original payload no matter how they were split,
//! ordered, or interleaved with other transactions.

use bytes::Bytes;
use courier_proto::{
    Frame, FrameSlices, FrameType, MAX_FRAME_PAYLOAD, Transaction, split_into_frames,
};
use proptest::prelude::*;

fn addr(b: u8) -> [u8; 32] {
    [b; 32]
}

fn reassemble(frames: &[Frame]) -> Vec<u8> {
    let first = &frames[0];
    let mut transaction = Transaction::new(
        first.header.frame_type().unwrap(),
        *first.header.src_address(),
        *first.header.dst_address(),
        first.header.transaction_id(),
        first.header.session_id(),
        first.header.total_size(),
    );
    for frame in frames {
        transaction
            .append_fragment(frame.header.offset(), Bytes::copy_from_slice(&frame.payload))
            .unwrap();
    }
    assert!(transaction.complete);
    transaction.result
}

#[test]
fn blob_walk_recovers_every_frame() {
    let payload = vec![0x11u8; 3 * MAX_FRAME_PAYLOAD + 17];
    let frames =
        split_into_frames(FrameType::CallRequest, &addr(1), &addr(2), 9, 4, "walk", &payload);
    assert_eq!(frames.len(), 4);

    let mut blob = Vec::new();
    for frame in &frames {
        frame.encode(&mut blob);
    }

    let walked: Vec<Frame> =
        FrameSlices::new(&blob).map(|slice| Frame::decode(slice).unwrap()).collect();
    assert_eq!(walked.len(), frames.len());
    assert_eq!(reassemble(&walked), payload);
}

#[test]
fn interleaved_transactions_reassemble_independently() {
    let payload_a = vec![0xAAu8; 2 * MAX_FRAME_PAYLOAD];
    let payload_b = vec![0xBBu8; 2 * MAX_FRAME_PAYLOAD + 5];

    let frames_a =
        split_into_frames(FrameType::CallRequest, &addr(1), &addr(2), 1, 0, "a", &payload_a);
    let frames_b =
        split_into_frames(FrameType::CallRequest, &addr(3), &addr(2), 2, 0, "b", &payload_b);

    // Interleave on the wire, as a router would deliver them.
    let mut blob = Vec::new();
    for pair in frames_a.iter().zip(frames_b.iter()) {
        pair.0.encode(&mut blob);
        pair.1.encode(&mut blob);
    }
    frames_b.last().unwrap().encode(&mut blob);

    let mut by_source: Vec<(u8, Frame)> = FrameSlices::new(&blob)
        .map(|slice| {
            let frame = Frame::decode(slice).unwrap();
            (frame.header.src_address()[0], frame)
        })
        .collect();

    let a: Vec<Frame> =
        by_source.iter().filter(|(src, _)| *src == 1).map(|(_, f)| f.clone()).collect();
    let b: Vec<Frame> = by_source.drain(..).filter(|(src, _)| *src == 3).map(|(_, f)| f).collect();

    assert_eq!(reassemble(&a), payload_a);
    assert_eq!(reassemble(&b), payload_b);
}

proptest! {
    #[test]
    fn split_walk_reassemble_round_trip(
        payload in prop::collection::vec(any::<u8>(), 0..(2 * MAX_FRAME_PAYLOAD + 100)),
        transaction_id in any::<u64>(),
        session_id in any::<u64>(),
    ) {
        let frames = split_into_frames(
            FrameType::CallResponse,
            &addr(7),
            &addr(8),
            transaction_id,
            session_id,
            "prop",
            &payload,
        );

        prop_assert_eq!(frames.len(), payload.len().div_ceil(MAX_FRAME_PAYLOAD).max(1));

        let mut blob = Vec::new();
        for frame in &frames {
            frame.encode(&mut blob);
        }

        // Reassemble in reverse arrival order.
        let mut walked: Vec<Frame> =
            FrameSlices::new(&blob).map(|s| Frame::decode(s).unwrap()).collect();
        walked.reverse();

        prop_assert_eq!(reassemble(&walked), payload);
    }

    #[test]
    fn every_fragment_carries_identity(
        payload in prop::collection::vec(any::<u8>(), 1..(3 * MAX_FRAME_PAYLOAD)),
    ) {
        let frames = split_into_frames(
            FrameType::CallRequest,
            &addr(5),
            &addr(6),
            42,
            13,
            "id",
            &payload,
        );

        for frame in &frames {
            prop_assert_eq!(frame.header.transaction_id(), 42);
            prop_assert_eq!(frame.header.session_id(), 13);
            prop_assert_eq!(frame.header.total_size() as usize, payload.len());
            prop_assert_eq!(frame.header.src_address(), &addr(5));
            prop_assert_eq!(frame.header.dst_address(), &addr(6));
            prop_assert!(frame.payload.len() <= MAX_FRAME_PAYLOAD);
        }
    }
}
