//! Error types for the gateway layer.

use std::time::Duration;

use hackroom_protocol::ProtocolError;
use hackroom_transport::TransportError;

/// A single remote call failed.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Connecting, sending or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request couldn't be encoded or the reply couldn't be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// No reply within the per-call timeout.
    #[error("call to {addr} timed out after {after:?}")]
    Timeout { addr: String, after: Duration },

    /// The peer closed the connection before replying.
    #[error("{addr} closed the connection without replying")]
    Closed { addr: String },

    /// The reply answered some other request.
    #[error("reply for request {got}, expected {expected}")]
    SequenceMismatch { expected: u64, got: u64 },

    /// The reply was well-formed but of the wrong kind for this call.
    #[error("expected a {expected} reply, got {got}")]
    UnexpectedReply { expected: &'static str, got: String },

    /// The room process reported that it couldn't handle the call.
    #[error("remote error: {0}")]
    Remote(String),
}

/// Every attempt allowed by a [`RetryPolicy`](crate::RetryPolicy) failed.
#[derive(Debug, thiserror::Error)]
#[error("{op} gave up after {attempts} attempt(s): {last}")]
pub struct RetryExhausted {
    /// What was being retried, e.g. `"handshake"`.
    pub op: String,
    pub attempts: u32,
    /// The error from the final attempt.
    #[source]
    pub last: GatewayError,
}
