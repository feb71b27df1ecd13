//! Caller-side view of one callee: the remote-peer state machine.
//!
//! A `RemotePeer` is created the first time an address is called and
//! walks three states: no transport key (fetch via 0x20/0x21), no
//! session (run the nonce/auth handshake), live (encrypted calls).
//! Recovery is by resets: a server-reported session error drops the
//! session but keeps the transport key; post-send integrity failures
//! drop everything and the next call starts from scratch.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use courier_crypto::{TransportKeys, Zeroizing, open, pack, seal, unpack};
use courier_proto::{
    Address, Frame, FrameType, MAX_TRANSACTION_SIZE, Transaction, split_into_frames,
};

use crate::{error::CallError, peer::Peer};

struct RemoteState {
    remote_transport_key: Option<[u8; 32]>,
    aes_key: Option<Zeroizing<[u8; 32]>>,
    session_id: u64,
    session_nonce_counter: u64,
    next_transaction_id: u64,
    auth_in_progress: bool,
    outgoing: HashMap<u64, Arc<Mutex<Transaction>>>,
}

/// Client-side state for calls to one remote address.
pub struct RemotePeer {
    remote_address: Address,
    auth_data: Vec<u8>,
    transport_keys: TransportKeys,
    state: Mutex<RemoteState>,
}

impl RemotePeer {
    /// Create the state machine for `remote_address`. A fresh transport
    /// keypair is generated per relationship, so every session rests on
    /// its own Diffie–Hellman agreement.
    #[must_use]
    pub fn new(remote_address: Address, auth_data: Vec<u8>) -> Self {
        Self {
            remote_address,
            auth_data,
            transport_keys: TransportKeys::generate(),
            state: Mutex::new(RemoteState {
                remote_transport_key: None,
                aes_key: None,
                session_id: 0,
                session_nonce_counter: 0,
                next_transaction_id: 1,
                auth_in_progress: false,
                outgoing: HashMap::new(),
            }),
        }
    }

    /// The callee's address.
    #[must_use]
    pub fn remote_address(&self) -> &Address {
        &self.remote_address
    }

    fn lock_state(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the callee's signature-verified transport public key (set
    /// by the engine when a 0x21 frame arrives).
    pub fn set_remote_transport_key(&self, key: [u8; 32]) {
        self.lock_state().remote_transport_key = Some(key);
    }

    /// Current session id; 0 when no session is live.
    #[must_use]
    pub fn session_id(&self) -> u64 {
        self.lock_state().session_id
    }

    fn remote_transport_key(&self) -> Option<[u8; 32]> {
        self.lock_state().remote_transport_key
    }

    /// Feed a response fragment to its outgoing transaction. Fragments
    /// for unknown transactions (timed out and removed) are dropped.
    pub fn process_response_frame(&self, frame: &Frame) {
        let header = &frame.header;
        if header.total_size() as usize > MAX_TRANSACTION_SIZE {
            return;
        }

        let transaction = {
            let state = self.lock_state();
            state.outgoing.get(&header.transaction_id()).cloned()
        };

        if let Some(transaction) = transaction {
            let mut transaction = transaction.lock().unwrap_or_else(PoisonError::into_inner);
            transaction.total_size = header.total_size();
            if let Err(error) = transaction.append_fragment(header.offset(), frame.payload.clone())
            {
                tracing::debug!(%error, "dropping response fragment");
            }
        }
    }

    /// Drop the session but keep the transport key; the next call
    /// re-runs the auth handshake only.
    pub fn reset_session(&self) {
        let mut state = self.lock_state();
        state.session_id = 0;
        state.aes_key = None;
    }

    /// Drop everything; the next call starts from the transport-key
    /// exchange.
    pub fn full_reset(&self) {
        let mut state = self.lock_state();
        state.session_id = 0;
        state.aes_key = None;
        state.remote_transport_key = None;
    }

    /// Invoke `function` on the callee, establishing transport key and
    /// session as needed, and wait up to `timeout` for the response.
    pub async fn call(
        &self,
        peer: &Arc<Peer>,
        function: &str,
        data: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, CallError> {
        if self.remote_transport_key().is_none() {
            self.request_transport_key(peer).await;
        }
        let Some(remote_transport_key) = self.remote_transport_key() else {
            return Err(CallError::NoRemoteTransportKey);
        };

        if self.session_id() == 0 {
            self.auth(peer, &remote_transport_key).await?;
        }

        let aes_key = self.lock_state().aes_key.clone();
        self.regular_call(peer, function, data, aes_key, timeout).await
    }

    /// Send a 0x20 frame and wait briefly for the engine to store the
    /// verified 0x21 answer.
    async fn request_transport_key(&self, peer: &Arc<Peer>) {
        let frames = split_into_frames(
            FrameType::GetPublicKeyRequest,
            &peer.address(),
            &self.remote_address,
            0,
            0,
            "GET_KEY",
            &[],
        );

        let config = peer.config();
        let Some(endpoint) = config.directory.router_for(&self.remote_address) else {
            return;
        };
        if let Err(error) = config.transport.write(&endpoint, &frames[0].to_vec()).await {
            tracing::debug!(%error, "transport key request failed");
            return;
        }

        let deadline = Instant::now() + config.transport_key_timeout;
        while Instant::now() < deadline {
            if self.remote_transport_key().is_some() {
                return;
            }
            tokio::time::sleep(config.completion_poll_tick).await;
        }
    }

    /// Run the two-step handshake: fetch a challenge nonce, then prove
    /// credentials under the fresh shared key and learn the session id.
    async fn auth(&self, peer: &Arc<Peer>, remote_transport_key: &[u8; 32]) -> Result<(), CallError> {
        {
            let mut state = self.lock_state();
            if state.auth_in_progress {
                return Err(CallError::AuthInProgress);
            }
            state.auth_in_progress = true;
        }

        let result = self.auth_inner(peer, remote_transport_key).await;
        self.lock_state().auth_in_progress = false;
        result
    }

    async fn auth_inner(
        &self,
        peer: &Arc<Peer>,
        remote_transport_key: &[u8; 32],
    ) -> Result<(), CallError> {
        let auth_timeout = peer.config().auth_timeout;

        let nonce = self
            .regular_call(peer, "/xchg-get-nonce", &[], None, auth_timeout)
            .await
            .map_err(|e| CallError::Auth(format!("get-nonce: {e}")))?;
        if nonce.len() != 16 {
            return Err(CallError::AuthNonceLength);
        }

        let shared = self.transport_keys.shared_key(remote_transport_key);
        self.lock_state().aes_key = Some(shared.clone());

        let mut secret = Vec::with_capacity(16 + self.auth_data.len());
        secret.extend_from_slice(&nonce);
        secret.extend_from_slice(&self.auth_data);
        let sealed = seal(&secret, &shared).map_err(|_| CallError::Encrypt)?;

        let mut body = Vec::with_capacity(32 + sealed.len());
        body.extend_from_slice(&self.transport_keys.public_bytes());
        body.extend_from_slice(&sealed);

        let response = self
            .regular_call(peer, "/xchg-auth", &body, None, auth_timeout)
            .await
            .map_err(|e| CallError::Auth(format!("auth: {e}")))?;

        let plain = open(&response, &shared).map_err(|_| {
            self.full_reset();
            CallError::Decrypt
        })?;
        if plain.len() != 8 {
            self.full_reset();
            return Err(CallError::AuthResponseLength);
        }

        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&plain);
        self.lock_state().session_id = u64::from_le_bytes(id_bytes);

        Ok(())
    }

    /// One call over the current channel. With a session key the
    /// payload is `(call_nonce | fn_len | function | params)`, packed
    /// and sealed; without one (handshake calls) it is the plain
    /// `(fn_len | function | params)`.
    async fn regular_call(
        &self,
        peer: &Arc<Peer>,
        function: &str,
        data: &[u8],
        aes_key: Option<Zeroizing<[u8; 32]>>,
        timeout: Duration,
    ) -> Result<Vec<u8>, CallError> {
        if function.len() > 255 {
            return Err(CallError::FunctionNameTooLong);
        }

        let (session_id, call_nonce) = {
            let mut state = self.lock_state();
            let nonce = state.session_nonce_counter;
            state.session_nonce_counter += 1;
            (state.session_id, nonce)
        };

        let payload = if let Some(key) = &aes_key {
            let mut plain = Vec::with_capacity(9 + function.len() + data.len());
            plain.extend_from_slice(&call_nonce.to_le_bytes());
            plain.push(function.len() as u8);
            plain.extend_from_slice(function.as_bytes());
            plain.extend_from_slice(data);

            let packed = pack(&plain).map_err(|_| {
                self.full_reset();
                CallError::Encrypt
            })?;
            seal(&packed, key).map_err(|_| {
                self.full_reset();
                CallError::Encrypt
            })?
        } else {
            let mut plain = Vec::with_capacity(1 + function.len() + data.len());
            plain.push(function.len() as u8);
            plain.extend_from_slice(function.as_bytes());
            plain.extend_from_slice(data);
            plain
        };

        let response = self
            .execute_transaction(peer, session_id, &payload, timeout, aes_key.as_ref(), function)
            .await?;

        let response = if let Some(key) = &aes_key {
            let opened = open(&response, key).map_err(|_| {
                self.full_reset();
                CallError::Decrypt
            })?;
            unpack(&opened).map_err(|_| {
                self.full_reset();
                CallError::Unpack
            })?
        } else {
            response
        };

        if response.is_empty() {
            self.full_reset();
            return Err(CallError::EmptyResponse);
        }

        match response[0] {
            0 => Ok(response[1..].to_vec()),
            1 => {
                let error =
                    CallError::Remote(String::from_utf8_lossy(&response[1..]).into_owned());
                if error.needs_new_session() {
                    self.reset_session();
                }
                Err(error)
            }
            _ => {
                self.full_reset();
                Err(CallError::BadStatusByte)
            }
        }
    }

    /// Fragment and send one request, then poll the mirror transaction
    /// until it completes or the deadline passes.
    async fn execute_transaction(
        &self,
        peer: &Arc<Peer>,
        session_id: u64,
        payload: &[u8],
        timeout: Duration,
        aes_key_at_send: Option<&Zeroizing<[u8; 32]>>,
        comment: &str,
    ) -> Result<Vec<u8>, CallError> {
        let transaction_id = {
            let mut state = self.lock_state();
            let id = state.next_transaction_id;
            state.next_transaction_id += 1;
            id
        };

        // The mirror transaction reassembles the *response*; its total
        // size is learned from the first response fragment.
        let mirror = Arc::new(Mutex::new(Transaction::new(
            FrameType::CallResponse,
            self.remote_address,
            peer.address(),
            transaction_id,
            session_id,
            0,
        )));
        self.lock_state().outgoing.insert(transaction_id, Arc::clone(&mirror));

        let config = peer.config();
        let Some(endpoint) = config.directory.router_for(&self.remote_address) else {
            self.unregister(transaction_id);
            return Err(CallError::NoRoute(hex::encode(self.remote_address)));
        };

        let frames = split_into_frames(
            FrameType::CallRequest,
            &peer.address(),
            &self.remote_address,
            transaction_id,
            session_id,
            comment,
            payload,
        );
        let mut blob = Vec::with_capacity(frames.iter().map(Frame::encoded_len).sum());
        for frame in &frames {
            frame.encode(&mut blob);
        }

        if let Err(error) = config.transport.write(&endpoint, &blob).await {
            self.unregister(transaction_id);
            return Err(CallError::Transport(error.to_string()));
        }

        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut transaction = mirror.lock().unwrap_or_else(PoisonError::into_inner);
                if transaction.complete {
                    let result = std::mem::take(&mut transaction.result);
                    let error = transaction.error.take();
                    drop(transaction);
                    self.unregister(transaction_id);

                    return match error {
                        Some(message) => Err(CallError::Transport(message)),
                        None => Ok(result),
                    };
                }
            }

            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(config.completion_poll_tick).await;
        }

        self.unregister(transaction_id);

        // A concurrent call may already have replaced the session; only
        // reset if the key we sent under is still the live one.
        {
            let mut state = self.lock_state();
            let key_changed = matches!(
                (aes_key_at_send, state.aes_key.as_ref()),
                (Some(sent), Some(current)) if **sent != **current
            );
            if !key_changed {
                state.session_id = 0;
                state.aes_key = None;
            }
        }

        Err(CallError::Timeout)
    }

    fn unregister(&self, transaction_id: u64) {
        self.lock_state().outgoing.remove(&transaction_id);
    }
}
