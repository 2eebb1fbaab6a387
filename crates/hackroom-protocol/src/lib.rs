//! Shared data model and wire protocol for hackroom.
//!
//! - **Types** ([`RoomKey`], [`PlayerId`], [`PlayerName`], [`Role`],
//!   [`Phase`], [`Admission`], [`GameStateView`]): the data model the
//!   master tier and room processes agree on.
//! - **Wire messages** ([`Request`], [`Response`], [`RoomCall`],
//!   [`RoomReply`], [`MasterCall`], [`MasterReply`]).
//! - **Identifiers** ([`new_room_key`], [`new_player_id`]).
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]).
//!
//! ```text
//! Transport (bytes) → Protocol (Request/Response) → Engine / Registry
//! ```

mod codec;
mod error;
mod ids;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use ids::{new_player_id, new_room_key};
pub use types::{
    Admission, ErrorKind, GameStateView, MasterCall, MasterReply, Phase, PlayerId,
    PlayerName, Request, Response, Role, RoomCall, RoomKey, RoomReply, MAX_NAME_LEN,
    ROOM_KEY_LEN,
};
