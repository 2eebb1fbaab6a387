//! Error types for the registry layer.

use hackroom_gateway::RetryExhausted;
use hackroom_protocol::{Admission, PlayerName, ProtocolError, RoomKey};

use crate::ProcessHandle;

/// Port pool errors.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// Every port in the range is taken.
    #[error("no free ports in {start}-{end}")]
    Exhausted { start: u16, end: u16 },

    /// The port was released without being assigned. The pool is left
    /// untouched.
    #[error("port {0} is not currently assigned")]
    InvalidState(u16),
}

/// The process runtime couldn't start, stop or inspect a room process.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to start room {room_key} on port {port}")]
    Spawn {
        room_key: RoomKey,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("no running process {0}")]
    UnknownProcess(ProcessHandle),

    #[error("failed to stop {handle}")]
    Stop {
        handle: ProcessHandle,
        #[source]
        source: std::io::Error,
    },
}

/// Bringing up a new room failed. No room record is left behind.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error(transparent)]
    Ports(#[from] PortError),

    /// Every generated key collided with an existing room.
    #[error("no unused room key after {attempts} attempts")]
    NoFreeKey { attempts: u32 },

    #[error("room {room_key} failed to start on port {port}")]
    Start {
        room_key: RoomKey,
        port: u16,
        #[source]
        source: RuntimeError,
    },

    /// The process started but never answered the handshake.
    #[error("room {room_key} on port {port} never became reachable")]
    Handshake {
        room_key: RoomKey,
        port: u16,
        #[source]
        source: RetryExhausted,
    },

    /// The room answered the handshake but didn't seat its creator.
    #[error("room {room_key} refused its creator: {admission}")]
    Rejected {
        room_key: RoomKey,
        admission: Admission,
    },
}

/// Errors surfaced by [`RoomRegistry`](crate::RoomRegistry) operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A name or room key failed validation.
    #[error(transparent)]
    Validation(#[from] ProtocolError),

    #[error("could not create a room: {0}")]
    CreateFailed(#[source] LaunchError),

    #[error("room {0} not found")]
    NotFound(RoomKey),

    #[error("name {name} is already taken in room {room_key}")]
    NameTaken { room_key: RoomKey, name: PlayerName },

    /// The room answered but turned the player away.
    #[error("room {room_key} rejected the join: {admission}")]
    Rejected {
        room_key: RoomKey,
        admission: Admission,
    },

    #[error("room {room_key} is unreachable")]
    Unreachable {
        room_key: RoomKey,
        #[source]
        source: RetryExhausted,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl RegistryError {
    /// Whether the same call may succeed if the caller simply tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CreateFailed(_) | Self::Unreachable { .. })
    }
}
