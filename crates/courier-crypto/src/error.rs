//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors from sealing, opening, key agreement, and the pack container.
///
/// Deliberately coarse: callers translate these into protocol error
/// codes or silent drops, and detailed reasons must not leak to the
/// network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD encryption failed (invalid key material).
    #[error("encryption failed")]
    Encrypt,

    /// AEAD decryption failed (wrong key, truncated input, or tamper).
    #[error("decryption failed")]
    Decrypt,

    /// Ciphertext shorter than the prepended nonce.
    #[error("ciphertext too short")]
    CiphertextTooShort,

    /// Signature bytes are malformed or do not verify.
    #[error("signature verification failed")]
    BadSignature,

    /// Public key bytes do not form a valid curve point.
    #[error("invalid public key")]
    BadPublicKey,

    /// Container writing failed.
    #[error("pack failed: {0}")]
    Pack(String),

    /// Container is not a valid archive or lacks the data entry.
    #[error("unpack failed: {0}")]
    Unpack(String),
}
