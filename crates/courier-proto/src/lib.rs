//! Wire protocol for the Courier overlay messaging fabric.
//!
//! Everything that crosses a router is a [`Frame`]: a fixed 128-byte
//! little-endian header followed by an opaque payload of at most
//! [`MAX_FRAME_PAYLOAD`] bytes. Routers only ever look at the header
//! (to extract the 32-byte destination address); peers use the header
//! to multiplex logical [`Transaction`]s that may span many frames.
//!
//! # Components
//!
//! - [`FrameHeader`]: zero-copy fixed-layout header
//! - [`Frame`]: header + payload, encode/decode
//! - [`FrameSlices`]: walk a concatenated length-prefixed blob
//! - [`split_into_frames`]: fragment a logical payload
//! - [`Transaction`]: out-of-order fragment reassembly
//! - [`ReadRequest`] / [`read_response`]: the router read wire format

#![forbid(unsafe_code)]

mod error;
mod frame;
mod header;
mod transaction;
mod wire;

pub use error::ProtocolError;
pub use frame::{Frame, FrameSlices, split_into_frames};
pub use header::{ADDRESS_SIZE, Address, FrameHeader, FrameType, MAX_FRAME_PAYLOAD};
pub use transaction::{MAX_TRANSACTION_SIZE, Transaction, TransactionKey};
pub use wire::{READ_REQUEST_SIZE, ReadRequest, read_response};

/// Convenience result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
