//! Router error types.

use thiserror::Error;

/// Errors surfaced by the router service and its HTTP skin.
///
/// Application-level problems (malformed frames, bad read requests) are
/// deliberately *not* here — the router drops those silently with a
/// statistics bump and never signals parsers to the network.
#[derive(Error, Debug)]
pub enum RouterError {
    /// Binding or serving the HTTP listener failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),
}
