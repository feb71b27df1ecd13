//! The application seam: one async callback for auth and calls.
//!
//! A server peer registers a single [`CallHandler`]. The engine invokes
//! it twice per relationship: once with an empty function name and the
//! offered credentials (authentication — an error rejects the handshake
//! silently), then once per call with the authenticated context. The
//! context carries a handle to the local peer so handlers can place
//! cascade calls back to their caller.

use std::sync::Arc;

use async_trait::async_trait;
use courier_proto::Address;

use crate::{error::ServiceError, peer::Peer};

/// Everything a handler learns about one invocation.
pub struct CallContext<'a> {
    /// The peer this handler is mounted on; usable for cascade calls.
    pub peer: &'a Arc<Peer>,
    /// Authenticated identity public key of the remote peer.
    pub remote_address: Address,
    /// Credential bytes the remote presented at auth time.
    pub auth_data: &'a [u8],
    /// Requested function name; empty during authentication.
    pub function: &'a str,
    /// Opaque call parameter bytes.
    pub parameter: &'a [u8],
}

/// Application callback mounted on a server peer.
#[async_trait]
pub trait CallHandler: Send + Sync {
    /// Authenticate (empty `function`) or execute a call.
    async fn handle(&self, context: CallContext<'_>) -> Result<Vec<u8>, ServiceError>;
}

/// Adapter turning a plain closure into a [`CallHandler`] for servers
/// that do not need async handling or cascade calls.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> CallHandler for FnHandler<F>
where
    F: for<'a> Fn(CallContext<'a>) -> Result<Vec<u8>, ServiceError> + Send + Sync,
{
    async fn handle(&self, context: CallContext<'_>) -> Result<Vec<u8>, ServiceError> {
        (self.0)(context)
    }
}
