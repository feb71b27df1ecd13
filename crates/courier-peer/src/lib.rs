//! Courier peer engine.
//!
//! Peers are addressed by their Ed25519 public keys and exchange
//! end-to-end-encrypted request/response calls through untrusted relay
//! routers. This crate owns everything above the wire format: the
//! worker loop and mailbox polling, session establishment and replay
//! protection on the callee side, and the remote-peer state machine on
//! the caller side.
//!
//! # Quick start
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use courier_peer::{
//!     CallContext, FnHandler, HttpTransport, Peer, PeerConfig, ServiceError, StaticDirectory,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let directory = Arc::new(StaticDirectory::single("127.0.0.1:8084"));
//! let transport = Arc::new(HttpTransport::new()?);
//! let config = PeerConfig::new(directory, transport);
//!
//! let server = Peer::start_server(
//!     config.clone(),
//!     None,
//!     Arc::new(FnHandler(|context: CallContext<'_>| match context.function {
//!         "" => Ok(Vec::new()), // accept any credentials
//!         "version" => Ok(b"v1".to_vec()),
//!         _ => Err(ServiceError::NotImplemented),
//!     })),
//! );
//!
//! let client = Peer::start_client(config);
//! let response = client
//!     .call(server.address(), b"", "version", b"", Duration::from_secs(2))
//!     .await?;
//! assert_eq!(response, b"v1");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod config;
mod directory;
mod error;
mod handler;
mod nonces;
mod peer;
mod remote_peer;
mod session;
mod snake;
mod transport;

pub use config::PeerConfig;
pub use directory::{NetworkMap, RouterDirectory, StaticDirectory};
pub use error::{CallError, ServiceError, TransportError};
pub use handler::{CallContext, CallHandler, FnHandler};
pub use nonces::{NONCE_SIZE, NoncePool};
pub use peer::Peer;
pub use remote_peer::RemotePeer;
pub use session::{REPLAY_WINDOW, Session};
pub use snake::{ReplayError, SnakeCounter};
pub use transport::{HttpTransport, MemoryTransport, RouterTransport};
