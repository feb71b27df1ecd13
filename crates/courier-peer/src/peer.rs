//! The peer engine: identity, worker loop, frame dispatch, sessions.
//!
//! A peer owns a long-lived Ed25519 identity (its public key is its
//! routable address) and an ephemeral X25519 transport keypair. A
//! single cooperative worker fans out long-poll reads against every
//! configured router (at most one in flight per router), purges idle
//! sessions, and periodically logs read statistics. Incoming frames are
//! dispatched by type: call requests reassemble into transactions and
//! run the server path, call responses feed the matching remote peer's
//! outgoing transaction, and the 0x20/0x21 pair answers transport-key
//! discovery with an identity-signed key.
//!
//! One engine-wide mutex guards the session table, the remote-peer map,
//! per-router cursors and in-flight flags, and counters; it is never
//! held across an await point.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use courier_crypto::{PeerIdentity, TransportKeys, Zeroizing, open, pack, seal, unpack, verify_signature};
use courier_proto::{
    Address, Frame, FrameSlices, FrameType, ReadRequest, Transaction, TransactionKey,
    read_response, split_into_frames,
};

use crate::{
    config::PeerConfig,
    error::{CallError, ServiceError},
    handler::{CallContext, CallHandler},
    nonces::NoncePool,
    remote_peer::RemotePeer,
    session::Session,
};

/// Size of the server-side challenge nonce pool.
const AUTH_NONCE_POOL: usize = 100;

/// Functions honored on session id 0 (plaintext, pre-auth).
const FN_GET_NONCE: &str = "/xchg-get-nonce";
const FN_AUTH: &str = "/xchg-auth";

struct PeerState {
    remote_peers: HashMap<Address, Arc<RemotePeer>>,
    incoming: HashMap<TransactionKey, Transaction>,
    sessions: HashMap<u64, Session>,
    next_session_id: u64,
    auth_nonces: NoncePool,
    polling: HashMap<String, bool>,
    cursors: HashMap<String, u64>,
    read_stats: HashMap<String, u64>,
}

/// A participant in the overlay fabric: caller, callee, or both.
///
/// Construct with [`Peer::start_server`] or [`Peer::start_client`]
/// (both require a running tokio runtime), call remotes with
/// [`Peer::call`], and shut down with [`Peer::stop`].
pub struct Peer {
    identity: PeerIdentity,
    transport_keys: TransportKeys,
    config: PeerConfig,
    handler: Option<Arc<dyn CallHandler>>,
    state: Mutex<PeerState>,
    started: AtomicBool,
    stopping: AtomicBool,
}

impl Peer {
    /// Start a serving peer. `identity` is the long-lived key; `None`
    /// generates an ephemeral one. The handler authenticates handshakes
    /// (empty function name) and executes calls.
    pub fn start_server(
        config: PeerConfig,
        identity: Option<PeerIdentity>,
        handler: Arc<dyn CallHandler>,
    ) -> Arc<Self> {
        Self::start(config, identity, Some(handler))
    }

    /// Start a calling-only peer with an ephemeral identity.
    pub fn start_client(config: PeerConfig) -> Arc<Self> {
        Self::start(config, None, None)
    }

    fn start(
        config: PeerConfig,
        identity: Option<PeerIdentity>,
        handler: Option<Arc<dyn CallHandler>>,
    ) -> Arc<Self> {
        let peer = Arc::new(Self {
            identity: identity.unwrap_or_else(PeerIdentity::generate),
            transport_keys: TransportKeys::generate(),
            config,
            handler,
            state: Mutex::new(PeerState {
                remote_peers: HashMap::new(),
                incoming: HashMap::new(),
                sessions: HashMap::new(),
                next_session_id: 1,
                auth_nonces: NoncePool::new(AUTH_NONCE_POOL),
                polling: HashMap::new(),
                cursors: HashMap::new(),
                read_stats: HashMap::new(),
            }),
            started: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        });

        tokio::spawn(worker_loop(Arc::clone(&peer)));
        peer
    }

    /// The peer's routable address (its identity public key).
    #[must_use]
    pub fn address(&self) -> Address {
        self.identity.address()
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    /// Number of live server-side sessions (diagnostics and tests).
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.lock_state().sessions.len()
    }

    /// Invoke `function` on the peer at `remote_address`.
    ///
    /// Establishes the transport key and an authenticated session on
    /// first use (with `auth_data` as the credential), then reuses the
    /// session for subsequent calls. Blocks up to `timeout`.
    ///
    /// A call that fails because the server lost the session (idle
    /// purge, peer restart) is retried once; the remote-peer state has
    /// already been reset by then, so the retry re-runs the handshake.
    pub async fn call(
        self: &Arc<Self>,
        remote_address: Address,
        auth_data: &[u8],
        function: &str,
        data: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, CallError> {
        if self.stopping.load(Ordering::Relaxed) {
            return Err(CallError::Stopped);
        }

        let remote = {
            let mut state = self.lock_state();
            state
                .remote_peers
                .entry(remote_address)
                .or_insert_with(|| {
                    Arc::new(RemotePeer::new(remote_address, auth_data.to_vec()))
                })
                .clone()
        };

        match remote.call(self, function, data, timeout).await {
            Err(error) if error.needs_new_session() || error == CallError::Decrypt => {
                remote.call(self, function, data, timeout).await
            }
            other => other,
        }
    }

    /// Graceful shutdown: signal the workers, wait up to the configured
    /// grace period for them to park.
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::Relaxed);

        let deadline = Instant::now() + self.config.stop_timeout;
        while self.started.load(Ordering::Relaxed) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if self.started.load(Ordering::Relaxed) {
            tracing::warn!("peer worker did not stop within the grace period");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Kick off one read task per configured router, skipping routers
    /// that already have a read in flight.
    fn spawn_router_reads(self: &Arc<Self>) {
        for endpoint in self.config.directory.endpoints() {
            let cursor = {
                let mut state = self.lock_state();
                if state.polling.get(&endpoint).copied().unwrap_or(false) {
                    continue;
                }
                state.polling.insert(endpoint.clone(), true);
                *state.read_stats.entry(endpoint.clone()).or_insert(0) += 1;
                state.cursors.get(&endpoint).copied().unwrap_or(0)
            };

            let peer = Arc::clone(self);
            tokio::spawn(async move {
                peer.read_router(endpoint, cursor).await;
            });
        }
    }

    /// One long-poll read against one router, then dispatch of whatever
    /// arrived. The in-flight flag is cleared before dispatch so the
    /// next read can start while handlers (possibly cascading calls)
    /// run.
    async fn read_router(self: Arc<Self>, endpoint: String, cursor: u64) {
        let request = ReadRequest {
            after_id: cursor,
            max_bytes: self.config.read_max_bytes,
            src_address: self.address(),
        }
        .encode();

        let result = self.config.transport.read(&endpoint, &request).await;

        let blob = match result {
            Ok(blob) => blob,
            Err(error) => {
                tracing::debug!(%error, %endpoint, "router read failed");
                self.lock_state().polling.insert(endpoint, false);
                return;
            }
        };

        let frames = match read_response::decode(&blob) {
            Some((last_id, frames)) => {
                let mut state = self.lock_state();
                state.cursors.insert(endpoint.clone(), last_id);
                state.polling.insert(endpoint.clone(), false);
                frames.to_vec()
            }
            None => {
                self.lock_state().polling.insert(endpoint, false);
                return;
            }
        };

        self.process_blob(&frames).await;
    }

    /// Walk a concatenated blob and dispatch each frame by type.
    async fn process_blob(self: &Arc<Self>, blob: &[u8]) {
        for slice in FrameSlices::new(blob) {
            let Ok(frame) = Frame::decode(slice) else {
                continue;
            };

            match frame.header.frame_type() {
                Some(FrameType::CallRequest) => {
                    if let Some(response_frames) = self.process_call_request(&frame).await {
                        self.send_frames(&response_frames).await;
                    }
                }
                Some(FrameType::CallResponse) => self.process_call_response(&frame),
                Some(FrameType::GetPublicKeyRequest) => {
                    let response_frames = self.process_get_key_request(&frame);
                    self.send_frames(&response_frames).await;
                }
                Some(FrameType::GetPublicKeyResponse) => self.process_get_key_response(&frame),
                None => {}
            }
        }
    }

    /// Reassemble an incoming call-request fragment; on completion run
    /// the server path and return the response fragments.
    async fn process_call_request(self: &Arc<Self>, frame: &Frame) -> Option<Vec<Frame>> {
        let header = &frame.header;
        let key = TransactionKey {
            src_address: *header.src_address(),
            transaction_id: header.transaction_id(),
        };

        let completed = {
            let mut state = self.lock_state();

            let ttl = self.config.incoming_transaction_ttl;
            state.incoming.retain(|_, transaction| transaction.begin.elapsed() <= ttl);

            let transaction = state.incoming.entry(key).or_insert_with(|| {
                Transaction::new(
                    FrameType::CallRequest,
                    *header.src_address(),
                    *header.dst_address(),
                    header.transaction_id(),
                    header.session_id(),
                    header.total_size(),
                )
            });

            if transaction.append_fragment(header.offset(), frame.payload.clone()).is_err() {
                state.incoming.remove(&key);
                return None;
            }

            if transaction.complete { state.incoming.remove(&key) } else { None }
        };

        let transaction = completed?;
        self.handler.as_ref()?;

        let (response, dont_send) = self
            .on_incoming_call(transaction.session_id, transaction.result, *header.src_address())
            .await;
        if dont_send {
            return None;
        }

        Some(split_into_frames(
            FrameType::CallResponse,
            &self.address(),
            header.src_address(),
            transaction.transaction_id,
            transaction.session_id,
            &header.comment(),
            &response,
        ))
    }

    /// Route a response fragment to the remote peer that is waiting on
    /// it.
    fn process_call_response(&self, frame: &Frame) {
        let remote = {
            let state = self.lock_state();
            state.remote_peers.get(frame.header.src_address()).cloned()
        };

        if let Some(remote) = remote {
            remote.process_response_frame(frame);
        }
    }

    /// Answer 0x20: our transport public key, signed by our identity so
    /// the caller can tie it to this address.
    fn process_get_key_request(&self, frame: &Frame) -> Vec<Frame> {
        let transport_public = self.transport_keys.public_bytes();
        let mut payload = Vec::with_capacity(32 + 64);
        payload.extend_from_slice(&transport_public);
        payload.extend_from_slice(&self.identity.sign(&transport_public));

        split_into_frames(
            FrameType::GetPublicKeyResponse,
            &self.address(),
            frame.header.src_address(),
            0,
            0,
            "GET_KEY",
            &payload,
        )
    }

    /// Handle 0x21: verify the signature against the sender's address
    /// (which *is* its identity key) before trusting the transport key.
    fn process_get_key_response(&self, frame: &Frame) {
        let payload = &frame.payload;
        if payload.len() != 32 + 64 {
            return;
        }

        let src = frame.header.src_address();
        if verify_signature(src, &payload[..32], &payload[32..]).is_err() {
            tracing::debug!("transport key signature rejected");
            return;
        }

        let mut transport_key = [0u8; 32];
        transport_key.copy_from_slice(&payload[..32]);

        let remote = {
            let state = self.lock_state();
            state.remote_peers.get(src).cloned()
        };
        if let Some(remote) = remote {
            remote.set_remote_transport_key(transport_key);
        }
    }

    /// The server-side call path. Returns `(response_body, dont_send)`;
    /// a `true` flag means the silent-drop rules apply and no frame may
    /// go out.
    async fn on_incoming_call(
        self: &Arc<Self>,
        session_id: u64,
        data: Vec<u8>,
        src_address: Address,
    ) -> (Vec<u8>, bool) {
        let mut session_key: Option<Zeroizing<[u8; 32]>> = None;
        let mut auth_data = Vec::new();
        let mut remote_public_key = src_address;
        let mut body = data;

        if session_id != 0 {
            let key = {
                let state = self.lock_state();
                match state.sessions.get(&session_id) {
                    None => return (error_response(&ServiceError::WrongSession), false),
                    // A session only serves the peer it was established
                    // with; a header naming someone else's session is
                    // rejected the same as an unknown one.
                    Some(session) if session.remote_public_key != src_address => {
                        return (error_response(&ServiceError::WrongSession), false);
                    }
                    Some(session) => session.aes_key.clone(),
                }
            };

            let Ok(opened) = open(&body, &key) else {
                // Silent: a bound session must not act as a decryption
                // oracle.
                return (Vec::new(), true);
            };
            let Ok(unpacked) = unpack(&opened) else {
                return (error_response(&ServiceError::Unpack), false);
            };
            if unpacked.len() < 9 {
                return (error_response(&ServiceError::WrongLength), false);
            }

            let mut nonce_bytes = [0u8; 8];
            nonce_bytes.copy_from_slice(&unpacked[..8]);
            let call_nonce = u64::from_le_bytes(nonce_bytes);

            {
                let mut state = self.lock_state();
                let Some(session) = state.sessions.get_mut(&session_id) else {
                    return (error_response(&ServiceError::WrongSession), false);
                };
                if session.snake.test_and_declare(call_nonce as i64).is_err() {
                    // Silent: replay probing learns nothing.
                    return (Vec::new(), true);
                }
                session.last_access = Instant::now();
                auth_data = session.auth_data.clone();
                remote_public_key = session.remote_public_key;
            }

            session_key = Some(key);
            body = unpacked[8..].to_vec();
        } else if body.is_empty() {
            return (error_response(&ServiceError::WrongLength), false);
        }

        let result = self.dispatch_function(session_id, &body, src_address, &auth_data, remote_public_key).await;

        let result = match result {
            Ok(value) => value,
            Err(error) if error.is_silent() => return (Vec::new(), true),
            Err(error) => Err(error),
        };

        let response = match result {
            Ok(bytes) => {
                let mut response = Vec::with_capacity(1 + bytes.len());
                response.push(0);
                response.extend_from_slice(&bytes);
                response
            }
            Err(error) => error_response(&error),
        };

        match session_key {
            Some(key) => {
                let Ok(packed) = pack(&response) else { return (Vec::new(), true) };
                match seal(&packed, &key) {
                    Ok(sealed) => (sealed, false),
                    Err(_) => (Vec::new(), true),
                }
            }
            None => (response, false),
        }
    }

    /// Parse the function header and run either the pre-auth built-ins
    /// (session 0) or the application handler.
    ///
    /// The outer `Result` is the silent-drop channel; the inner one is
    /// what gets a status byte on the wire.
    #[allow(clippy::type_complexity)]
    async fn dispatch_function(
        self: &Arc<Self>,
        session_id: u64,
        body: &[u8],
        src_address: Address,
        auth_data: &[u8],
        remote_public_key: Address,
    ) -> Result<Result<Vec<u8>, ServiceError>, ServiceError> {
        if body.is_empty() {
            return Ok(Err(ServiceError::WrongLength));
        }
        let function_len = body[0] as usize;
        if body.len() < 1 + function_len {
            return Ok(Err(ServiceError::WrongFunctionLength));
        }
        let function = String::from_utf8_lossy(&body[1..1 + function_len]).into_owned();
        let parameter = &body[1 + function_len..];

        if session_id == 0 {
            return match function.as_str() {
                FN_GET_NONCE => {
                    let nonce = self.lock_state().auth_nonces.next();
                    Ok(Ok(nonce.to_vec()))
                }
                FN_AUTH => match self.process_auth(parameter, src_address).await {
                    Some(response) => Ok(Ok(response)),
                    // Failed auth is indistinguishable from silence.
                    None => Err(ServiceError::WrongNonce),
                },
                // Unknown pre-auth functions are not acknowledged.
                _ => Err(ServiceError::WrongNonce),
            };
        }

        Ok(self.invoke_handler(remote_public_key, auth_data, &function, parameter).await)
    }

    /// `/xchg-auth`: recover the shared key, check the challenge nonce,
    /// consult the application, allocate the session. `None` = reject
    /// silently (the caller only ever observes a timeout).
    async fn process_auth(
        self: &Arc<Self>,
        parameter: &[u8],
        src_address: Address,
    ) -> Option<Vec<u8>> {
        if parameter.len() < 32 {
            return None;
        }

        let mut remote_transport_key = [0u8; 32];
        remote_transport_key.copy_from_slice(&parameter[..32]);
        let shared = self.transport_keys.shared_key(&remote_transport_key);

        let plain = open(&parameter[32..], &shared).ok()?;
        if plain.len() < 16 {
            return None;
        }

        {
            let mut state = self.lock_state();
            if !state.auth_nonces.check(&plain[..16]) {
                return None;
            }
        }

        let auth_bytes = plain[16..].to_vec();
        if self.invoke_handler(src_address, &auth_bytes, "", &[]).await.is_err() {
            return None;
        }

        let session_id = {
            let mut state = self.lock_state();
            let id = state.next_session_id;
            state.next_session_id += 1;
            state
                .sessions
                .insert(id, Session::new(id, shared.clone(), auth_bytes, src_address));
            id
        };
        tracing::debug!(session_id, "session established");

        seal(&session_id.to_le_bytes(), &shared).ok()
    }

    async fn invoke_handler(
        self: &Arc<Self>,
        remote_address: Address,
        auth_data: &[u8],
        function: &str,
        parameter: &[u8],
    ) -> Result<Vec<u8>, ServiceError> {
        let Some(handler) = self.handler.clone() else {
            return Err(ServiceError::NotImplemented);
        };

        handler
            .handle(CallContext { peer: self, remote_address, auth_data, function, parameter })
            .await
    }

    /// Concatenate and deposit frames at the router serving their
    /// destination. All frames of one leg share a destination.
    async fn send_frames(&self, frames: &[Frame]) {
        let Some(first) = frames.first() else { return };
        let dst = *first.header.dst_address();

        let Some(endpoint) = self.config.directory.router_for(&dst) else {
            tracing::debug!("no route for destination");
            return;
        };

        let mut blob = Vec::with_capacity(frames.iter().map(Frame::encoded_len).sum());
        for frame in frames {
            frame.encode(&mut blob);
        }

        if let Err(error) = self.config.transport.write(&endpoint, &blob).await {
            tracing::debug!(%error, "frame write failed");
        }
    }

    /// Drop sessions idle past the configured timeout.
    fn purge_sessions(&self) {
        let idle_timeout = self.config.session_idle_timeout;
        let mut state = self.lock_state();
        state.sessions.retain(|id, session| {
            let keep = session.last_access.elapsed() <= idle_timeout;
            if !keep {
                tracing::debug!(session_id = id, "session removed");
            }
            keep
        });
    }

    fn log_read_stats(&self) {
        let stats = self.lock_state().read_stats.clone();
        for (endpoint, reads) in stats {
            tracing::debug!(%endpoint, reads, "router read counter");
        }
    }
}

fn error_response(error: &ServiceError) -> Vec<u8> {
    let message = error.to_string();
    let mut response = Vec::with_capacity(1 + message.len());
    response.push(1);
    response.extend_from_slice(message.as_bytes());
    response
}

/// Cooperative worker: read fan-out, session purge, stat logging.
async fn worker_loop(peer: Arc<Peer>) {
    peer.started.store(true, Ordering::Relaxed);

    let mut last_purge = Instant::now();
    let mut last_stats = Instant::now();

    while !peer.stopping.load(Ordering::Relaxed) {
        peer.spawn_router_reads();

        if last_purge.elapsed() >= peer.config.session_purge_interval {
            peer.purge_sessions();
            last_purge = Instant::now();
        }
        if last_stats.elapsed() >= peer.config.stats_interval {
            peer.log_read_stats();
            last_stats = Instant::now();
        }

        tokio::time::sleep(peer.config.worker_tick).await;
    }

    peer.started.store(false, Ordering::Relaxed);
}
