//! Fixed-size pool of single-use challenge nonces.
//!
//! Each 16-byte slot is `index (u32 LE) | complexity (1) | random (11)`.
//! Embedding the slot index in the nonce itself makes validation O(1):
//! `check` reads the index back out of the first four bytes, compares
//! the full value, and regenerates the slot on a match so a nonce can
//! never be accepted twice. Issuing rotates through the ring, so a
//! pool of N tolerates N outstanding handshakes.

use rand::RngCore;

/// Nonce length in bytes.
pub const NONCE_SIZE: usize = 16;

/// Ring of single-use 16-byte nonces.
pub struct NoncePool {
    nonces: Vec<[u8; NONCE_SIZE]>,
    current: usize,
    complexity: u8,
}

impl NoncePool {
    /// Create a pool with `size` slots, all pre-filled.
    #[must_use]
    pub fn new(size: usize) -> Self {
        let mut pool =
            Self { nonces: vec![[0u8; NONCE_SIZE]; size.max(1)], current: 0, complexity: 0 };
        for i in 0..pool.nonces.len() {
            pool.fill_slot(i);
        }
        pool
    }

    /// Issue the next nonce and advance the ring. The slot is
    /// regenerated first, so every issued value is fresh.
    pub fn next(&mut self) -> [u8; NONCE_SIZE] {
        self.fill_slot(self.current);
        let nonce = self.nonces[self.current];
        self.current = (self.current + 1) % self.nonces.len();
        nonce
    }

    /// Validate a presented nonce. On success the slot is regenerated,
    /// consuming the nonce.
    pub fn check(&mut self, nonce: &[u8]) -> bool {
        if nonce.len() != NONCE_SIZE {
            return false;
        }

        let mut index_bytes = [0u8; 4];
        index_bytes.copy_from_slice(&nonce[0..4]);
        let index = u32::from_le_bytes(index_bytes) as usize;

        let Some(slot) = self.nonces.get(index) else {
            return false;
        };
        if slot[..] != nonce[..] {
            return false;
        }

        self.fill_slot(index);
        true
    }

    fn fill_slot(&mut self, index: usize) {
        if let Some(slot) = self.nonces.get_mut(index) {
            slot[0..4].copy_from_slice(&(index as u32).to_le_bytes());
            slot[4] = self.complexity;
            rand::thread_rng().fill_bytes(&mut slot[5..]);
        }
    }
}
