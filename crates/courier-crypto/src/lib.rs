//! Cryptographic primitives for the Courier overlay fabric.
//!
//! Peers are addressed by Ed25519 public keys ([`PeerIdentity`]), agree
//! on AES-256 session keys through ephemeral X25519 transport keys
//! ([`TransportKeys`]), and seal session traffic with AES-256-GCM
//! ([`seal`] / [`open`]). Sealed payloads are wrapped in a tiny
//! self-describing container first ([`pack`] / [`unpack`]) so variable
//! lengths survive the AEAD round trip.
//!
//! All primitives are used with their standard contracts; nothing here
//! is a novel construction.

#![forbid(unsafe_code)]

mod aead;
mod error;
mod keys;
mod pack;

pub use aead::{AES_KEY_SIZE, NONCE_SIZE, open, seal};
pub use error::CryptoError;
pub use keys::{PeerIdentity, SIGNATURE_SIZE, TransportKeys, verify_signature};
pub use pack::{pack, unpack};
pub use zeroize::Zeroizing;

/// Convenience result alias for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
