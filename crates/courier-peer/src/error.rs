//! Error taxonomy for the peer engine.
//!
//! Two layers with different audiences:
//!
//! - [`ServiceError`] is what a *callee* produces. Its `Display` output
//!   is the stable wire code carried in a status-1 response body, so
//!   callers on old builds can still pattern-match it.
//! - [`CallError`] is what a *caller* observes. Integrity failures are
//!   recovered locally by state-machine resets; the variants only tell
//!   the application what happened.
//!
//! Some callee errors are never sent at all — replay rejections, failed
//! auth, unknown session-0 functions and bound-session decrypt failures
//! are silent drops so the network learns nothing from probing.

use thiserror::Error;

/// Wire code fragment that marks a response requiring re-auth.
pub const CODE_WRONG_SESSION: &str = "#WRONG_SESSION";

/// Wire code fragment for a replay-window rejection (internal only —
/// the frame is dropped, but the code participates in caller matching
/// for compatibility).
pub const CODE_WRONG_NONCE: &str = "#WRONG_NONCE";

/// Callee-side errors, rendered as stable wire codes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Presented session id is unknown or bound to another peer.
    #[error("#WRONG_SESSION")]
    WrongSession,

    /// Session payload failed AEAD authentication. Not sent on the
    /// wire — bound-session decrypt failures are silent drops.
    #[error("#DECR")]
    Decrypt,

    /// Session payload decrypted but the container was invalid.
    #[error("#UNPACK")]
    Unpack,

    /// Payload too short for the fixed call header.
    #[error("#WRONG_LEN")]
    WrongLength,

    /// Function name extends past the payload.
    #[error("#WRONG_LEN_FN")]
    WrongFunctionLength,

    /// Call nonce outside the replay window. Never sent — silent drop.
    #[error("#WRONG_NONCE")]
    WrongNonce,

    /// The handler rejected the caller's credentials.
    #[error("#ACCESS_DENIED")]
    AccessDenied,

    /// The handler does not implement the requested function.
    #[error("#NOT_IMPLEMENTED")]
    NotImplemented,

    /// Application-defined error, forwarded verbatim to the caller.
    #[error("{0}")]
    App(String),
}

impl ServiceError {
    /// True for errors that must never produce a response frame.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::WrongNonce | Self::Decrypt)
    }
}

/// Caller-side errors from [`crate::Peer::call`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The remote never answered the transport-key request.
    #[error("no remote transport public key")]
    NoRemoteTransportKey,

    /// Function names are length-prefixed with a single byte.
    #[error("function name longer than 255 bytes")]
    FunctionNameTooLong,

    /// A handshake step failed; the stage and cause are in the message.
    #[error("auth failed: {0}")]
    Auth(String),

    /// Another task is already running the handshake for this peer.
    #[error("auth already in progress")]
    AuthInProgress,

    /// The nonce returned by the callee was not 16 bytes.
    #[error("auth nonce has wrong length")]
    AuthNonceLength,

    /// The auth response did not decrypt to an 8-byte session id.
    #[error("auth response has wrong length")]
    AuthResponseLength,

    /// Sealing the outgoing call failed.
    #[error("request encryption failed")]
    Encrypt,

    /// The response failed AEAD authentication.
    #[error("response decryption failed")]
    Decrypt,

    /// The response decrypted but the container was invalid.
    #[error("response unpack failed")]
    Unpack,

    /// The response body was empty (no status byte).
    #[error("response too short")]
    EmptyResponse,

    /// The status byte was neither 0 nor 1.
    #[error("unknown response status byte")]
    BadStatusByte,

    /// No response within the caller-supplied deadline.
    #[error("transaction timeout")]
    Timeout,

    /// The callee reported an error (status byte 1).
    #[error("remote error: {0}")]
    Remote(String),

    /// No router endpoint is known for the destination address.
    #[error("no route to {0}")]
    NoRoute(String),

    /// The underlying transport failed to deliver.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer is stopping.
    #[error("peer is stopping")]
    Stopped,
}

impl CallError {
    /// True when the remote's answer means the session is gone and the
    /// next call must re-run the handshake (transport key is kept).
    #[must_use]
    pub fn needs_new_session(&self) -> bool {
        match self {
            Self::Remote(message) => {
                message.contains(CODE_WRONG_SESSION) || message.contains(CODE_WRONG_NONCE)
            }
            _ => false,
        }
    }

    /// True for post-send integrity failures that force a full reset of
    /// the remote-peer state (session *and* transport key).
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::Encrypt
                | Self::Decrypt
                | Self::Unpack
                | Self::EmptyResponse
                | Self::BadStatusByte
        )
    }
}

/// Transport-level delivery errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// HTTP round trip failed.
    #[error("http error: {0}")]
    Http(String),

    /// The endpoint is not registered with this transport.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_session_wire_code_round_trips_through_remote_error() {
        let wire = ServiceError::WrongSession.to_string();
        let seen = CallError::Remote(wire);
        assert!(seen.needs_new_session());
    }

    #[test]
    fn app_errors_do_not_force_reauth() {
        let seen = CallError::Remote("#ACCESS_DENIED".to_string());
        assert!(!seen.needs_new_session());
    }

    #[test]
    fn integrity_failures_are_classified() {
        assert!(CallError::Decrypt.is_integrity_failure());
        assert!(CallError::BadStatusByte.is_integrity_failure());
        assert!(!CallError::Timeout.is_integrity_failure());
        assert!(!CallError::Remote("#WRONG_SESSION".into()).is_integrity_failure());
    }

    #[test]
    fn silent_service_errors() {
        assert!(ServiceError::WrongNonce.is_silent());
        assert!(ServiceError::Decrypt.is_silent());
        assert!(!ServiceError::WrongSession.is_silent());
    }
}
