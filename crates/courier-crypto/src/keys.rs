//! Identity and transport key material.
//!
//! A peer carries two keypairs with different lifetimes:
//!
//! - the long-lived Ed25519 **identity** ([`PeerIdentity`]) whose public
//!   key bytes *are* the peer's routable address, and
//! - an ephemeral X25519 **transport** keypair ([`TransportKeys`]),
//!   regenerated on every start, used only to agree on session keys.
//!
//! Binding between the two happens at the protocol layer: a peer hands
//! out its transport public key signed by its identity key.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroizing;

use crate::{aead::AES_KEY_SIZE, error::CryptoError};

/// Ed25519 signature size in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Long-lived Ed25519 identity keypair. The 32-byte public key doubles
/// as the peer's address in router mailboxes.
#[derive(Clone)]
pub struct PeerIdentity {
    signing: SigningKey,
}

impl PeerIdentity {
    /// Generate a fresh random identity.
    #[must_use]
    pub fn generate() -> Self {
        Self { signing: SigningKey::generate(&mut OsRng) }
    }

    /// Derive the identity from a 32-byte seed (e.g. the output of a
    /// mnemonic key-derivation path).
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self { signing: SigningKey::from_bytes(seed) }
    }

    /// The peer's address: its raw Ed25519 public key bytes.
    #[must_use]
    pub fn address(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Verifying half of the keypair.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Sign a message with the identity key.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for PeerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerIdentity").field("address", &hex32(&self.address())).finish()
    }
}

/// Verify an Ed25519 signature against a 32-byte address.
///
/// # Errors
///
/// - [`CryptoError::BadPublicKey`] if the address is not a valid key
/// - [`CryptoError::BadSignature`] if the signature is malformed or
///   does not verify
pub fn verify_signature(
    address: &[u8; 32],
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let key = VerifyingKey::from_bytes(address).map_err(|_| CryptoError::BadPublicKey)?;
    let signature = Signature::from_slice(signature).map_err(|_| CryptoError::BadSignature)?;
    key.verify(message, &signature).map_err(|_| CryptoError::BadSignature)
}

/// Ephemeral X25519 keypair used for session establishment only.
pub struct TransportKeys {
    secret: StaticSecret,
    public: X25519Public,
}

impl TransportKeys {
    /// Generate a fresh transport keypair.
    #[must_use]
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self { secret, public }
    }

    /// Public half, shipped to remote peers (signed by the identity).
    #[must_use]
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Diffie–Hellman agreement with a remote transport public key.
    /// The 32-byte shared secret is used directly as an AES-256 key and
    /// is zeroed when dropped.
    #[must_use]
    pub fn shared_key(&self, remote_public: &[u8; 32]) -> Zeroizing<[u8; AES_KEY_SIZE]> {
        let remote = X25519Public::from(*remote_public);
        Zeroizing::new(self.secret.diffie_hellman(&remote).to_bytes())
    }
}

impl std::fmt::Debug for TransportKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportKeys").field("public", &hex32(&self.public_bytes())).finish()
    }
}

fn hex32(bytes: &[u8; 32]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
