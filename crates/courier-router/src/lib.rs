//! Courier relay router.
//!
//! A router is a blind, memory-only mailbox fleet: it accepts opaque
//! frames addressed to 32-byte destinations, holds them for a few
//! seconds, and serves them to whoever polls for that destination. It
//! never inspects payloads, keeps no per-client state beyond the
//! mailboxes themselves, and answers application-level garbage by
//! silently skipping it.
//!
//! # Components
//!
//! - [`Mailbox`]: bounded per-destination frame queue
//! - [`Router`]: address → mailbox map, monotonic ids, statistics,
//!   maintenance ticker
//! - [`http`]: the `POST /api/{r,w}` + `GET /api/{debug,stat}` skin
//!
//! The router core takes plain byte bodies, so any transport capable of
//! request/response byte exchange (or a direct in-process call, as the
//! peer test harness does) can front it.

#![forbid(unsafe_code)]

mod error;
pub mod http;
mod mailbox;
mod router;
mod stats;

pub use error::RouterError;
pub use mailbox::{Mailbox, ReadOutcome};
pub use router::{PROTOCOL_VERSION, Router, RouterConfig};
pub use stats::{RequestKind, RouterRates, RouterTotals};
