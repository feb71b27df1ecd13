//! Router service: address → mailbox map, monotonic ids, statistics,
//! and the once-a-second maintenance pass.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use courier_proto::{Address, FrameHeader, FrameSlices, ReadRequest, read_response};
use serde::Serialize;

use crate::{
    mailbox::Mailbox,
    stats::{RequestKind, RouterRates, RouterTotals},
};

/// Version stamp carried in the stat document.
pub const PROTOCOL_VERSION: u32 = 1;

/// Router tunables. Defaults match the protocol constants; tests shrink
/// them to keep wall-clock time down.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Per-mailbox entry cap; the oldest entry is dropped beyond it.
    pub max_messages_per_mailbox: usize,
    /// Entries older than this are swept from mailbox heads.
    pub frame_ttl: Duration,
    /// Mailboxes idle longer than this are dropped entirely.
    pub mailbox_idle_ttl: Duration,
    /// Long-poll read deadline.
    pub long_poll_timeout: Duration,
    /// Long-poll re-check interval.
    pub long_poll_tick: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_messages_per_mailbox: 100_000_000,
            frame_ttl: Duration::from_secs(5),
            mailbox_idle_ttl: Duration::from_secs(10),
            long_poll_timeout: Duration::from_secs(10),
            long_poll_tick: Duration::from_millis(10),
        }
    }
}

struct RouterState {
    addresses: HashMap<Address, Arc<Mailbox>>,
    next_id: u64,
}

struct StatsState {
    totals: RouterTotals,
    last_totals: RouterTotals,
    last_snapshot: Instant,
    rates: RouterRates,
}

struct Documents {
    debug: Vec<u8>,
    stat: Vec<u8>,
}

/// The relay router: a map of per-destination mailboxes with a
/// process-monotonic frame id counter and aggregate statistics.
///
/// Strongly consistent within one process only; there is no cross-router
/// replication. One long-lived value per router process.
pub struct Router {
    config: RouterConfig,
    state: Mutex<RouterState>,
    stats: Mutex<StatsState>,
    documents: Mutex<Documents>,
    stopping: AtomicBool,
}

impl Router {
    /// Create a router with the given configuration.
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        let router = Self {
            config,
            state: Mutex::new(RouterState { addresses: HashMap::new(), next_id: 1 }),
            stats: Mutex::new(StatsState {
                totals: RouterTotals::default(),
                last_totals: RouterTotals::default(),
                last_snapshot: Instant::now(),
                rates: RouterRates::default(),
            }),
            documents: Mutex::new(Documents { debug: Vec::new(), stat: Vec::new() }),
            stopping: AtomicBool::new(false),
        };
        router.rebuild_documents();
        router
    }

    /// The configuration this router runs with.
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Deposit every well-formed frame in a concatenated blob.
    ///
    /// Malformed tails are skipped silently — the router is a dumb
    /// mailbox and never reports parse failures.
    pub fn put_blob(&self, blob: &[u8]) {
        for frame in FrameSlices::new(blob) {
            self.put_frame(frame);
        }
    }

    /// Deposit one frame. Returns `false` (after a silent skip) when the
    /// frame fails structural validation.
    pub fn put_frame(&self, frame: &[u8]) -> bool {
        let Ok(header) = FrameHeader::from_bytes(frame) else {
            return false;
        };
        if header.length() as usize != frame.len() {
            return false;
        }
        let dst = *header.dst_address();

        let (mailbox, id) = {
            let Ok(mut state) = self.state.lock() else { return false };
            let id = state.next_id;
            state.next_id += 1;
            let mailbox = state
                .addresses
                .entry(dst)
                .or_insert_with(|| Arc::new(Mailbox::new(self.config.max_messages_per_mailbox)))
                .clone();
            (mailbox, id)
        };

        mailbox.put(id, frame.to_vec());

        if let Ok(mut stats) = self.stats.lock() {
            stats.totals.frames_in += 1;
            stats.totals.bytes_in += frame.len() as u64;
        }
        true
    }

    /// Answer a read request body with `(response, frame_count)`.
    ///
    /// The response is `last_id (u64 LE) || frames`. A request for an
    /// address with no mailbox answers cursor 0, which tells the reader
    /// this router has never seen traffic for it. `None` means the
    /// request itself was malformed (too short) and deserves no body.
    #[must_use]
    pub fn get_messages(&self, request: &[u8]) -> Option<(Vec<u8>, usize)> {
        let request = ReadRequest::decode(request).ok()?;

        let mailbox = {
            let state = self.state.lock().ok()?;
            state.addresses.get(&request.src_address).cloned()
        };

        let Some(mailbox) = mailbox else {
            return Some((read_response::encode(0, &[]), 0));
        };

        let outcome = mailbox.get_after(request.after_id, request.max_bytes);

        if let Ok(mut stats) = self.stats.lock() {
            stats.totals.frames_out += outcome.count as u64;
            stats.totals.bytes_out += outcome.data.len() as u64;
        }

        Some((read_response::encode(outcome.last_id, &outcome.data), outcome.count))
    }

    /// Long-poll wrapper around [`Router::get_messages`]: returns as
    /// soon as at least one frame is available, or the last empty
    /// response once the deadline passes. `None` for malformed requests.
    pub async fn read_long_poll(&self, request: &[u8]) -> Option<Vec<u8>> {
        let deadline = Instant::now() + self.config.long_poll_timeout;
        loop {
            let (response, count) = self.get_messages(request)?;
            if count > 0 || Instant::now() >= deadline || self.stopping.load(Ordering::Relaxed) {
                return Some(response);
            }
            tokio::time::sleep(self.config.long_poll_tick).await;
        }
    }

    /// Count one request against the per-endpoint statistics.
    pub fn declare_request(&self, kind: RequestKind) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.totals.declare_request(kind);
        }
    }

    /// Cached debug document (rebuilt every maintenance tick).
    #[must_use]
    pub fn debug_document(&self) -> Vec<u8> {
        self.documents.lock().map_or_else(|_| Vec::new(), |docs| docs.debug.clone())
    }

    /// Cached stat document (the rate block alone).
    #[must_use]
    pub fn stat_document(&self) -> Vec<u8> {
        self.documents.lock().map_or_else(|_| Vec::new(), |docs| docs.stat.clone())
    }

    /// Number of live mailboxes.
    #[must_use]
    pub fn address_count(&self) -> usize {
        self.state.lock().map_or(0, |state| state.addresses.len())
    }

    /// Spawn the once-a-second maintenance loop. The task exits after
    /// [`Router::shutdown`] is observed.
    pub fn start_maintenance(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            while !router.stopping.load(Ordering::Relaxed) {
                tokio::time::sleep(Duration::from_secs(1)).await;
                router.maintenance_tick();
            }
        })
    }

    /// Signal the maintenance loop and any in-flight long polls to wind
    /// down.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::Relaxed);
    }

    /// One maintenance pass: drop idle mailboxes, sweep aged frames,
    /// snapshot statistics, rebuild the cached JSON documents.
    pub fn maintenance_tick(&self) {
        let survivors: Vec<Arc<Mailbox>> = {
            let Ok(mut state) = self.state.lock() else { return };
            state
                .addresses
                .retain(|_, mailbox| mailbox.idle_for() <= self.config.mailbox_idle_ttl);
            state.addresses.values().cloned().collect()
        };

        for mailbox in survivors {
            mailbox.sweep(self.config.frame_ttl);
        }

        if let Ok(mut stats) = self.stats.lock() {
            let elapsed = stats.last_snapshot.elapsed().as_secs_f64();
            stats.rates =
                RouterRates::derive(&stats.totals, &stats.last_totals, elapsed, PROTOCOL_VERSION);
            stats.last_totals = stats.totals;
            stats.last_snapshot = Instant::now();
        }

        self.rebuild_documents();
    }

    fn rebuild_documents(&self) {
        #[derive(Serialize)]
        struct AddressInfo {
            address: String,
            messages: usize,
        }

        #[derive(Serialize)]
        struct DebugInfo {
            address_count: usize,
            next_msg_id: u64,
            stat_total: RouterTotals,
            stat_in_second: RouterRates,
            addresses: Vec<AddressInfo>,
        }

        let (mut addresses, next_msg_id) = {
            let Ok(state) = self.state.lock() else { return };
            let addresses: Vec<AddressInfo> = state
                .addresses
                .iter()
                .map(|(address, mailbox)| AddressInfo {
                    address: hex_address(address),
                    messages: mailbox.len(),
                })
                .collect();
            (addresses, state.next_id)
        };
        addresses.sort_by(|a, b| a.address.cmp(&b.address));

        let (totals, rates) = {
            let Ok(stats) = self.stats.lock() else { return };
            (stats.totals, stats.rates)
        };

        let info = DebugInfo {
            address_count: addresses.len(),
            next_msg_id,
            stat_total: totals,
            stat_in_second: rates,
            addresses,
        };

        let debug = serde_json::to_vec_pretty(&info).unwrap_or_default();
        let stat = serde_json::to_vec_pretty(&rates).unwrap_or_default();

        if let Ok(mut docs) = self.documents.lock() {
            docs.debug = debug;
            docs.stat = stat;
        }
    }
}

fn hex_address(address: &Address) -> String {
    address.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use courier_proto::{Frame, FrameType, split_into_frames};

    use super::*;

    fn frame_to(dst: [u8; 32], payload: &[u8]) -> Vec<u8> {
        let frames =
            split_into_frames(FrameType::CallRequest, &[9; 32], &dst, 1, 0, "test", payload);
        frames[0].to_vec()
    }

    fn read_request(address: [u8; 32], after_id: u64) -> Vec<u8> {
        ReadRequest { after_id, max_bytes: 10 << 20, src_address: address }.encode().to_vec()
    }

    #[test]
    fn put_then_get_round_trip() {
        let router = Router::new(RouterConfig::default());
        let dst = [3u8; 32];
        assert!(router.put_frame(&frame_to(dst, b"hello")));

        let (response, count) = router.get_messages(&read_request(dst, 0)).unwrap();
        assert_eq!(count, 1);
        let (last_id, frames) = read_response::decode(&response).unwrap();
        assert_eq!(last_id, 1);
        let frame = Frame::decode(frames).unwrap();
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn unknown_address_answers_cursor_zero() {
        let router = Router::new(RouterConfig::default());
        let (response, count) = router.get_messages(&read_request([1; 32], 42)).unwrap();
        assert_eq!(count, 0);
        assert_eq!(read_response::decode(&response).unwrap().0, 0);
    }

    #[test]
    fn malformed_read_request_is_dropped() {
        let router = Router::new(RouterConfig::default());
        assert!(router.get_messages(&[0u8; 20]).is_none());
    }

    #[test]
    fn malformed_frames_in_blob_are_skipped() {
        let router = Router::new(RouterConfig::default());
        let dst = [4u8; 32];
        let mut blob = frame_to(dst, b"ok");
        blob.extend_from_slice(&[0xFF; 17]);
        router.put_blob(&blob);

        let (_, count) = router.get_messages(&read_request(dst, 0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn ids_are_monotonic_across_mailboxes() {
        let router = Router::new(RouterConfig::default());
        router.put_frame(&frame_to([1; 32], b"a"));
        router.put_frame(&frame_to([2; 32], b"b"));
        router.put_frame(&frame_to([1; 32], b"c"));

        let (response, _) = router.get_messages(&read_request([1; 32], 0)).unwrap();
        let (last_id, _) = read_response::decode(&response).unwrap();
        assert_eq!(last_id, 3);
    }

    #[test]
    fn idle_mailboxes_are_dropped_by_maintenance() {
        let config =
            RouterConfig { mailbox_idle_ttl: Duration::ZERO, ..RouterConfig::default() };
        let router = Router::new(config);
        router.put_frame(&frame_to([5; 32], b"x"));
        assert_eq!(router.address_count(), 1);

        router.maintenance_tick();
        assert_eq!(router.address_count(), 0);
    }

    #[test]
    fn debug_document_lists_addresses() {
        let router = Router::new(RouterConfig::default());
        router.put_frame(&frame_to([0xAB; 32], b"x"));
        router.maintenance_tick();

        let doc = String::from_utf8(router.debug_document()).unwrap();
        assert!(doc.contains(&"ab".repeat(32)));
        assert!(doc.contains("\"address_count\": 1"));
    }
}
