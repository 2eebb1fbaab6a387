//! Error types for the protocol layer.
//!
//! Covers two things: values that fail validation when they enter the
//! system (room keys, player names), and bytes that fail to encode or
//! decode on the wire.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, or an
    /// unknown `method` / `type` tag.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A room key is not 6 uppercase letters or digits.
    #[error("invalid room key {0:?}: expected 6 characters A-Z or 0-9")]
    InvalidRoomKey(String),

    /// A display name is empty, too long, or has characters outside
    /// `a-z A-Z 0-9 _`.
    #[error("invalid name {0:?}: use a-z, A-Z, 0-9, _, max 20 characters")]
    InvalidName(String),
}
