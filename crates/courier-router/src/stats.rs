//! Router statistics: running totals and derived per-second rates.
//!
//! Totals are bumped inline on the hot paths; once a second the
//! maintenance ticker diffs them against the previous snapshot and
//! publishes a rate block. Both shapes serialize straight into the
//! debug/stat JSON documents.

use serde::Serialize;

/// Which endpoint a request hit, for per-endpoint counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// `POST /api/r`
    Read,
    /// `POST /api/w`
    Write,
    /// `GET /api/debug`
    Debug,
    /// `GET /api/stat`
    Stat,
    /// Anything else
    Unknown,
}

/// Monotonic counters since router start.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct RouterTotals {
    /// Frames deposited.
    pub frames_in: u64,
    /// Frames served to readers.
    pub frames_out: u64,
    /// Payload bytes deposited.
    pub bytes_in: u64,
    /// Payload bytes served.
    pub bytes_out: u64,

    /// All requests.
    pub requests: u64,
    /// Read requests.
    pub requests_r: u64,
    /// Write requests.
    pub requests_w: u64,
    /// Debug requests.
    pub requests_d: u64,
    /// Stat requests.
    pub requests_s: u64,
    /// Requests to unknown URIs.
    pub requests_f: u64,
}

impl RouterTotals {
    /// Count one request against the matching endpoint counter.
    pub fn declare_request(&mut self, kind: RequestKind) {
        self.requests += 1;
        match kind {
            RequestKind::Read => self.requests_r += 1,
            RequestKind::Write => self.requests_w += 1,
            RequestKind::Debug => self.requests_d += 1,
            RequestKind::Stat => self.requests_s += 1,
            RequestKind::Unknown => self.requests_f += 1,
        }
    }
}

/// Per-second rates derived from two total snapshots.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct RouterRates {
    /// Frames deposited per second.
    pub frames_in: u64,
    /// Frames served per second.
    pub frames_out: u64,
    /// Bytes deposited per second.
    pub bytes_in: u64,
    /// Bytes served per second.
    pub bytes_out: u64,
    /// Bytes deposited per second, in KiB.
    pub kilobytes_in: u64,
    /// Bytes served per second, in KiB.
    pub kilobytes_out: u64,

    /// Requests per second.
    pub requests: u64,
    /// Read requests per second.
    pub requests_r: u64,
    /// Write requests per second.
    pub requests_w: u64,
    /// Debug requests per second.
    pub requests_d: u64,
    /// Unknown-URI requests per second.
    pub requests_f: u64,

    /// Protocol version stamp.
    pub version: u32,
}

impl RouterRates {
    /// Derive rates from the totals accumulated over `elapsed_secs`.
    #[must_use]
    pub fn derive(
        current: &RouterTotals,
        previous: &RouterTotals,
        elapsed_secs: f64,
        version: u32,
    ) -> Self {
        if elapsed_secs <= 0.0 {
            return Self { version, ..Self::default() };
        }

        let per_sec = |now: u64, then: u64| ((now.saturating_sub(then)) as f64 / elapsed_secs) as u64;

        let bytes_in = per_sec(current.bytes_in, previous.bytes_in);
        let bytes_out = per_sec(current.bytes_out, previous.bytes_out);

        Self {
            frames_in: per_sec(current.frames_in, previous.frames_in),
            frames_out: per_sec(current.frames_out, previous.frames_out),
            bytes_in,
            bytes_out,
            kilobytes_in: bytes_in / 1024,
            kilobytes_out: bytes_out / 1024,
            requests: per_sec(current.requests, previous.requests),
            requests_r: per_sec(current.requests_r, previous.requests_r),
            requests_w: per_sec(current.requests_w, previous.requests_w),
            requests_d: per_sec(current.requests_d, previous.requests_d),
            requests_f: per_sec(current.requests_f, previous.requests_f),
            version,
        }
    }
}
