//! AES-256-GCM sealing with a prepended random nonce.
//!
//! Wire layout: `[nonce: 12 bytes] + [ciphertext + tag]`. Both sides of
//! a session derive the same 32-byte key via X25519, so a fresh random
//! nonce per message is required — session traffic is bidirectional and
//! counters are not shared.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};

use crate::error::CryptoError;

/// AES-256 key size in bytes.
pub const AES_KEY_SIZE: usize = 32;

/// GCM nonce size in bytes, prepended to every sealed message.
pub const NONCE_SIZE: usize = 12;

/// Encrypt `plaintext` under `key` with a fresh random nonce.
///
/// # Errors
///
/// [`CryptoError::Encrypt`] — practically unreachable with a 32-byte
/// key, kept as a `Result` so callers propagate uniformly.
pub fn seal(plaintext: &[u8], key: &[u8; AES_KEY_SIZE]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher.encrypt(&nonce, plaintext).map_err(|_| CryptoError::Encrypt)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a message produced by [`seal`].
///
/// # Errors
///
/// - [`CryptoError::CiphertextTooShort`] if the input cannot hold a nonce
/// - [`CryptoError::Decrypt`] on authentication failure (wrong key or
///   tampered bytes)
pub fn open(sealed: &[u8], key: &[u8; AES_KEY_SIZE]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_SIZE {
        return Err(CryptoError::CiphertextTooShort);
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(key.into());

    cipher.decrypt(Nonce::from_slice(nonce), ciphertext).map_err(|_| CryptoError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];

    #[test]
    fn seal_open_round_trip() {
        let sealed = seal(b"attack at dawn", &KEY).unwrap();
        assert_eq!(open(&sealed, &KEY).unwrap(), b"attack at dawn");
    }

    #[test]
    fn nonces_differ_between_seals() {
        let a = seal(b"same", &KEY).unwrap();
        let b = seal(b"same", &KEY).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let mut sealed = seal(b"payload", &KEY).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert_eq!(open(&sealed, &KEY), Err(CryptoError::Decrypt));
    }

    #[test]
    fn wrong_key_rejected() {
        let sealed = seal(b"payload", &KEY).unwrap();
        assert_eq!(open(&sealed, &[0x43; 32]), Err(CryptoError::Decrypt));
    }

    #[test]
    fn short_input_rejected() {
        assert_eq!(open(&[0u8; 4], &KEY), Err(CryptoError::CiphertextTooShort));
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let sealed = seal(b"", &KEY).unwrap();
        assert_eq!(open(&sealed, &KEY).unwrap(), Vec::<u8>::new());
    }
}
