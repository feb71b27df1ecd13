//! Service-level router tests: long-poll behavior, cursor monotonicity,
//! sweeping, and the statistics documents.

use std::{sync::Arc, time::Duration};

use courier_proto::{FrameType, ReadRequest, read_response, split_into_frames};
use courier_router::{Router, RouterConfig};

fn frame_to(dst: [u8; 32], transaction_id: u64, payload: &[u8]) -> Vec<u8> {
    split_into_frames(FrameType::CallRequest, &[9; 32], &dst, transaction_id, 0, "t", payload)[0]
        .to_vec()
}

fn read_request(address: [u8; 32], after_id: u64) -> Vec<u8> {
    ReadRequest { after_id, max_bytes: 10 << 20, src_address: address }.encode().to_vec()
}

#[tokio::test]
async fn long_poll_returns_early_when_data_arrives() {
    let router = Arc::new(Router::new(RouterConfig {
        long_poll_timeout: Duration::from_secs(5),
        ..RouterConfig::default()
    }));
    let dst = [1u8; 32];

    let poller = Arc::clone(&router);
    let request = read_request(dst, 0);
    let poll = tokio::spawn(async move { poller.read_long_poll(&request).await });

    // Deposit after the poll has started.
    tokio::time::sleep(Duration::from_millis(50)).await;
    router.put_frame(&frame_to(dst, 1, b"wake up"));

    let started = std::time::Instant::now();
    let body = poll.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(4), "poll must return early");

    let (last_id, frames) = read_response::decode(&body).unwrap();
    assert_eq!(last_id, 1);
    assert!(!frames.is_empty());
}

#[tokio::test]
async fn long_poll_times_out_empty() {
    let router = Router::new(RouterConfig {
        long_poll_timeout: Duration::from_millis(100),
        ..RouterConfig::default()
    });

    let body = router.read_long_poll(&read_request([2; 32], 7)).await.unwrap();
    let (last_id, frames) = read_response::decode(&body).unwrap();
    // No mailbox for this address: the router reports cursor 0.
    assert_eq!(last_id, 0);
    assert!(frames.is_empty());
}

#[test]
fn cursors_are_monotone_across_reads() {
    let router = Router::new(RouterConfig::default());
    let dst = [3u8; 32];

    let mut cursor = 0u64;
    let mut seen = Vec::new();

    for round in 0..5 {
        for i in 0..3u64 {
            router.put_frame(&frame_to(dst, round * 3 + i, b"payload"));
        }

        let (body, count) = router.get_messages(&read_request(dst, cursor)).unwrap();
        let (last_id, _) = read_response::decode(&body).unwrap();
        assert_eq!(count, 3);
        assert!(last_id > cursor || (last_id == 0 && cursor == 0));
        cursor = last_id;
        seen.push(last_id);
    }

    let mut sorted = seen.clone();
    sorted.sort_unstable();
    assert_eq!(seen, sorted, "returned cursors must be non-decreasing");
}

#[test]
fn frames_are_delivered_in_id_order() {
    let router = Router::new(RouterConfig::default());
    let dst = [4u8; 32];

    for i in 0..10u64 {
        router.put_frame(&frame_to(dst, i, format!("payload-{i}").as_bytes()));
    }

    let (body, count) = router.get_messages(&read_request(dst, 0)).unwrap();
    assert_eq!(count, 10);

    let (_, frames_blob) = read_response::decode(&body).unwrap();
    let transaction_ids: Vec<u64> = courier_proto::FrameSlices::new(frames_blob)
        .map(|slice| courier_proto::Frame::decode(slice).unwrap().header.transaction_id())
        .collect();
    let mut sorted = transaction_ids.clone();
    sorted.sort_unstable();
    assert_eq!(transaction_ids, sorted);
}

#[tokio::test]
async fn maintenance_sweeps_aged_frames() {
    let router = Router::new(RouterConfig {
        frame_ttl: Duration::from_millis(50),
        ..RouterConfig::default()
    });
    let dst = [5u8; 32];
    router.put_frame(&frame_to(dst, 1, b"short-lived"));

    tokio::time::sleep(Duration::from_millis(120)).await;
    router.maintenance_tick();

    let (_, count) = router.get_messages(&read_request(dst, 0)).unwrap();
    assert_eq!(count, 0, "aged frame should be swept");
}

#[test]
fn stat_document_carries_version_and_rates() {
    let router = Router::new(RouterConfig::default());
    router.put_frame(&frame_to([6; 32], 1, b"x"));
    router.maintenance_tick();

    let stat: serde_json::Value = serde_json::from_slice(&router.stat_document()).unwrap();
    assert_eq!(stat["version"], courier_router::PROTOCOL_VERSION);
    assert!(stat.get("frames_in").is_some());
    assert!(stat.get("kilobytes_out").is_some());

    let debug: serde_json::Value = serde_json::from_slice(&router.debug_document()).unwrap();
    assert_eq!(debug["address_count"], 1);
    assert_eq!(debug["stat_total"]["frames_in"], 1);
    assert_eq!(debug["addresses"][0]["messages"], 1);
}
