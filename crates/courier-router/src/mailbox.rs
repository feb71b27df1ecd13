//! Per-destination mailbox.
//!
//! A mailbox is a short-lived rendezvous, not durable storage: entries
//! older than a few seconds are swept, the whole mailbox disappears
//! after ten idle seconds, and a hard cap bounds memory under write
//! floods. Each mailbox has its own mutex so concurrent deposits and
//! polls on different destinations never contend.

use std::{
    collections::VecDeque,
    sync::Mutex,
    time::{Duration, Instant},
};

struct MailboxEntry {
    id: u64,
    received_at: Instant,
    data: Vec<u8>,
}

struct MailboxInner {
    entries: VecDeque<MailboxEntry>,
    last_touch: Instant,
}

/// Result of a [`Mailbox::get_after`] poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Concatenated frame bytes.
    pub data: Vec<u8>,
    /// Cursor for the caller's next read.
    pub last_id: u64,
    /// Number of frames included in `data`.
    pub count: usize,
}

/// Bounded queue of opaque frames for one destination address.
pub struct Mailbox {
    max_messages: usize,
    inner: Mutex<MailboxInner>,
}

impl Mailbox {
    /// Create an empty mailbox with the given entry cap.
    #[must_use]
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages,
            inner: Mutex::new(MailboxInner {
                entries: VecDeque::new(),
                last_touch: Instant::now(),
            }),
        }
    }

    /// Append a frame under the given router-assigned id and bump the
    /// touch timestamp. Drops the oldest entry beyond the cap.
    pub fn put(&self, id: u64, frame: Vec<u8>) {
        let Ok(mut inner) = self.inner.lock() else { return };
        inner.entries.push_back(MailboxEntry { id, received_at: Instant::now(), data: frame });
        if inner.entries.len() > self.max_messages {
            inner.entries.pop_front();
        }
        inner.last_touch = Instant::now();
    }

    /// Collect frames with id strictly greater than `after_id`, stopping
    /// before the first frame that would push the output past
    /// `max_bytes`.
    ///
    /// If the caller's cursor is ahead of everything stored (a router
    /// restart regressed the id counter), the whole queue is sent; if
    /// even that yields nothing, the oldest stored id is reported so the
    /// caller can resynchronize.
    #[must_use]
    pub fn get_after(&self, after_id: u64, max_bytes: u64) -> ReadOutcome {
        let mut outcome = ReadOutcome { data: Vec::new(), last_id: after_id, count: 0 };

        let Ok(inner) = self.inner.lock() else { return outcome };

        let (oldest_id, newest_id) = match (inner.entries.front(), inner.entries.back()) {
            (Some(first), Some(last)) => (first.id, last.id),
            _ => return outcome,
        };

        let send_all = after_id > newest_id;
        let effective_after = if send_all { 0 } else { after_id };

        for entry in &inner.entries {
            if entry.id <= effective_after {
                continue;
            }
            if (outcome.data.len() + entry.data.len()) as u64 >= max_bytes {
                break;
            }
            outcome.data.extend_from_slice(&entry.data);
            outcome.last_id = entry.id;
            outcome.count += 1;
        }

        if outcome.count == 0 && send_all {
            outcome.last_id = oldest_id;
        }

        outcome
    }

    /// Drop entries older than `frame_ttl` from the head of the queue.
    pub fn sweep(&self, frame_ttl: Duration) {
        let now = Instant::now();
        let Ok(mut inner) = self.inner.lock() else { return };
        while let Some(front) = inner.entries.front() {
            if now.duration_since(front.received_at) >= frame_ttl {
                inner.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time since the last deposit.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.inner.lock().map_or(Duration::ZERO, |inner| inner.last_touch.elapsed())
    }

    /// Number of stored frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map_or(0, |inner| inner.entries.len())
    }

    /// True when no frames are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
