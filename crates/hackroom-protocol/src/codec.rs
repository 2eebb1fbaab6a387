//! Codec trait and implementations for turning wire messages into bytes.
//!
//! The server handler and the gateway client only depend on [`Codec`],
//! so the encoding can change without touching either side.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes values to bytes and decodes them back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or a
    /// field fails validation (e.g. a bad room key).
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that speaks JSON via `serde_json`.
///
/// ```rust
/// use hackroom_protocol::{Codec, JsonCodec, PlayerId, Request, RoomCall};
///
/// let codec = JsonCodec;
/// let request = Request {
///     seq: 1,
///     call: RoomCall::GetGameState { room_key: None, player_id: PlayerId::numbered(1) },
/// };
///
/// let bytes = codec.encode(&request).unwrap();
/// let decoded: Request<RoomCall> = codec.decode(&bytes).unwrap();
/// assert_eq!(request, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
