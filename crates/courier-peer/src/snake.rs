//! Sliding-window replay detector.
//!
//! Call nonces within a session are a monotone counter, but fragments
//! and whole calls may overtake each other in the mailbox, so strict
//! "greater than last" would reject legitimate traffic. The window
//! tracks the last `size` counters: newer values shift the window
//! forward, older values are accepted exactly once if they fall inside
//! it, and anything before the window is rejected outright.

use thiserror::Error;

/// Rejection reasons from [`SnakeCounter::test_and_declare`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayError {
    /// Counter fell out of the window on the old side.
    #[error("counter below replay window")]
    TooOld,

    /// Counter was already accepted.
    #[error("counter already used")]
    AlreadyUsed,
}

/// Replay window over a per-session call-nonce counter.
///
/// Cell `i` of `data` is 1 iff counter `last_processed - i` has been
/// seen. The struct is not internally synchronized — sessions own one
/// each and access it under the engine lock.
#[derive(Debug, Clone)]
pub struct SnakeCounter {
    size: usize,
    data: Vec<u8>,
    last_processed: i64,
}

impl SnakeCounter {
    /// Create a window of `size` cells and declare `initial` as already
    /// processed, so replays of pre-session counters are rejected.
    #[must_use]
    pub fn new(size: usize, initial: i64) -> Self {
        let size = size.max(1);
        let mut counter = Self { size, data: vec![1u8; size], last_processed: -1 };
        let _ = counter.test_and_declare(initial);
        counter
    }

    /// Highest counter value accepted so far.
    #[must_use]
    pub fn last_processed(&self) -> i64 {
        self.last_processed
    }

    /// Accept-or-reject a counter, marking it used on acceptance.
    ///
    /// # Errors
    ///
    /// - [`ReplayError::TooOld`] below the window
    /// - [`ReplayError::AlreadyUsed`] for duplicates (or values at the
    ///   window's trailing edge)
    pub fn test_and_declare(&mut self, counter: i64) -> Result<(), ReplayError> {
        if counter < self.last_processed - self.size as i64 {
            return Err(ReplayError::TooOld);
        }

        if counter > self.last_processed {
            let shift = (counter - self.last_processed) as usize;
            let mut fresh = vec![0u8; self.size];
            for (i, cell) in fresh.iter_mut().enumerate() {
                if let Some(previous) = i.checked_sub(shift) {
                    if previous < self.size {
                        *cell = self.data[previous];
                    }
                }
            }
            self.data = fresh;
            self.data[0] = 1;
            self.last_processed = counter;
            return Ok(());
        }

        let index = (self.last_processed - counter) as usize;
        if index < self.size && self.data[index] == 0 {
            self.data[index] = 1;
            return Ok(());
        }

        Err(ReplayError::AlreadyUsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotone_sequence_is_accepted() {
        let mut counter = SnakeCounter::new(100, 0);
        for value in 1..=50 {
            counter.test_and_declare(value).unwrap();
        }
        assert_eq!(counter.last_processed(), 50);
    }

    #[test]
    fn duplicate_is_rejected() {
        let mut counter = SnakeCounter::new(100, 0);
        counter.test_and_declare(5).unwrap();
        assert_eq!(counter.test_and_declare(5), Err(ReplayError::AlreadyUsed));
    }

    #[test]
    fn initial_value_counts_as_used() {
        let mut counter = SnakeCounter::new(100, 0);
        assert_eq!(counter.test_and_declare(0), Err(ReplayError::AlreadyUsed));
    }

    #[test]
    fn out_of_order_within_window_accepted_once() {
        let mut counter = SnakeCounter::new(100, 0);
        counter.test_and_declare(10).unwrap();
        counter.test_and_declare(7).unwrap();
        assert_eq!(counter.test_and_declare(7), Err(ReplayError::AlreadyUsed));
    }

    #[test]
    fn far_past_is_rejected() {
        let mut counter = SnakeCounter::new(10, 0);
        counter.test_and_declare(500).unwrap();
        assert_eq!(counter.test_and_declare(400), Err(ReplayError::TooOld));
    }

    #[test]
    fn window_slides_with_new_maximum() {
        let mut counter = SnakeCounter::new(10, 0);
        counter.test_and_declare(5).unwrap();
        counter.test_and_declare(20).unwrap();
        // 5 slid out of the 10-wide window ending at 20.
        assert_eq!(counter.test_and_declare(5), Err(ReplayError::TooOld));
        // 15 is inside the window and unseen.
        counter.test_and_declare(15).unwrap();
    }

    #[test]
    fn large_jump_clears_vacated_cells() {
        let mut counter = SnakeCounter::new(5, 0);
        counter.test_and_declare(1000).unwrap();
        counter.test_and_declare(999).unwrap();
        counter.test_and_declare(996).unwrap();
        assert_eq!(counter.test_and_declare(996), Err(ReplayError::AlreadyUsed));
    }
}
