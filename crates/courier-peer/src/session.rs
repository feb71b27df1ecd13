//! Server-side session state.

use std::time::Instant;

use courier_crypto::Zeroizing;
use courier_proto::Address;

use crate::snake::SnakeCounter;

/// Width of the per-session replay window.
pub const REPLAY_WINDOW: usize = 100;

/// An authenticated encrypted channel, as the callee sees it.
///
/// Created by a successful `/xchg-auth`, touched on every bound call,
/// and purged after the idle timeout. The session pins the remote's
/// *real* public key: bound calls whose frame source differs are
/// rejected, so a header cannot borrow someone else's session.
pub struct Session {
    /// Non-zero session id handed to the caller.
    pub id: u64,
    /// AES-256 key agreed via the transport-key exchange.
    pub aes_key: Zeroizing<[u8; 32]>,
    /// Credential bytes accepted by the auth callback.
    pub auth_data: Vec<u8>,
    /// The caller's identity public key.
    pub remote_public_key: Address,
    /// Replay window over the caller's call nonces.
    pub snake: SnakeCounter,
    /// Last bound call, for idle purging.
    pub last_access: Instant,
}

impl Session {
    /// Create a session at the moment of successful authentication.
    #[must_use]
    pub fn new(
        id: u64,
        aes_key: Zeroizing<[u8; 32]>,
        auth_data: Vec<u8>,
        remote_public_key: Address,
    ) -> Self {
        Self {
            id,
            aes_key,
            auth_data,
            remote_public_key,
            snake: SnakeCounter::new(REPLAY_WINDOW, 0),
            last_access: Instant::now(),
        }
    }
}
