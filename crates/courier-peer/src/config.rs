//! Peer engine configuration.

use std::{sync::Arc, time::Duration};

use crate::{directory::RouterDirectory, transport::RouterTransport};

/// Tunables for a peer. Defaults are the protocol constants; tests
/// shrink the timeouts to keep wall-clock time down.
#[derive(Clone)]
pub struct PeerConfig {
    /// Resolves router endpoints for addresses.
    pub directory: Arc<dyn RouterDirectory>,
    /// Byte transport to routers.
    pub transport: Arc<dyn RouterTransport>,

    /// Worker loop tick.
    pub worker_tick: Duration,
    /// Byte budget per long-poll read.
    pub read_max_bytes: u64,
    /// Sessions idle longer than this are purged.
    pub session_idle_timeout: Duration,
    /// How often the purge pass runs.
    pub session_purge_interval: Duration,
    /// Incomplete incoming transactions older than this are dropped.
    pub incoming_transaction_ttl: Duration,
    /// How long a caller waits for a remote transport key after 0x20.
    pub transport_key_timeout: Duration,
    /// Per-step deadline during the auth handshake.
    pub auth_timeout: Duration,
    /// How often per-router read counters are logged.
    pub stats_interval: Duration,
    /// Poll interval on an outgoing transaction's completion flag.
    pub completion_poll_tick: Duration,
    /// Grace period for workers to observe a stop request.
    pub stop_timeout: Duration,
}

impl PeerConfig {
    /// Configuration with protocol-default timings.
    #[must_use]
    pub fn new(directory: Arc<dyn RouterDirectory>, transport: Arc<dyn RouterTransport>) -> Self {
        Self {
            directory,
            transport,
            worker_tick: Duration::from_millis(10),
            read_max_bytes: 10 * 1024 * 1024,
            session_idle_timeout: Duration::from_secs(60),
            session_purge_interval: Duration::from_secs(5),
            incoming_transaction_ttl: Duration::from_secs(10),
            transport_key_timeout: Duration::from_secs(2),
            auth_timeout: Duration::from_secs(1),
            stats_interval: Duration::from_secs(10),
            completion_poll_tick: Duration::from_millis(10),
            stop_timeout: Duration::from_secs(1),
        }
    }
}
