//! What the RPC server dispatches to.

use std::future::Future;

use hackroom_engine::GameEngine;
use hackroom_gateway::RoomGateway;
use hackroom_protocol::{
    ErrorKind, MasterCall, MasterReply, ProtocolError, RoomCall, RoomReply,
};
use hackroom_registry::{ProcessRuntime, RegistryError, RoomRegistry, Seat};
use serde::{de::DeserializeOwned, Serialize};

/// One request in, one reply out.
pub trait RpcHandler: Send + Sync + 'static {
    type Call: DeserializeOwned + Send;
    type Reply: Serialize + Send;

    fn handle(&self, call: Self::Call) -> impl Future<Output = Self::Reply> + Send;

    /// Reply to a request whose call couldn't be decoded.
    fn malformed(&self, error: &ProtocolError) -> Self::Reply;
}

/// Serves one room's [`GameEngine`]. This is what a room process runs.
pub struct EngineService {
    engine: GameEngine,
}

impl EngineService {
    pub fn new(engine: GameEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }
}

impl RpcHandler for EngineService {
    type Call = RoomCall;
    type Reply = RoomReply;

    async fn handle(&self, call: RoomCall) -> RoomReply {
        self.engine.handle(call).await
    }

    fn malformed(&self, error: &ProtocolError) -> RoomReply {
        RoomReply::Error {
            message: error.to_string(),
        }
    }
}

/// Serves the master tier's [`RoomRegistry`] to front ends.
pub struct MasterService<R, G> {
    registry: RoomRegistry<R, G>,
}

impl<R: ProcessRuntime, G: RoomGateway> MasterService<R, G> {
    pub fn new(registry: RoomRegistry<R, G>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RoomRegistry<R, G> {
        &self.registry
    }
}

impl<R: ProcessRuntime, G: RoomGateway> RpcHandler for MasterService<R, G> {
    type Call = MasterCall;
    type Reply = MasterReply;

    async fn handle(&self, call: MasterCall) -> MasterReply {
        let result = match call {
            MasterCall::CreateRoom { player_name } => {
                self.registry.create_room(&player_name).await.map(seat_reply)
            }
            MasterCall::JoinRoom {
                room_key,
                player_name,
            } => self
                .registry
                .join_room(&room_key, &player_name)
                .await
                .map(seat_reply),
            MasterCall::QueryState {
                room_key,
                player_id,
            } => self
                .registry
                .query_state(&room_key, &player_id)
                .await
                .map(MasterReply::GameState),
            MasterCall::CloseRoom { room_key } => self
                .registry
                .close_room(&room_key)
                .await
                .map(|room_key| MasterReply::Closed { room_key }),
        };
        result.unwrap_or_else(|e| error_reply(&e))
    }

    fn malformed(&self, error: &ProtocolError) -> MasterReply {
        MasterReply::Error {
            kind: ErrorKind::BadRequest,
            message: error.to_string(),
            retryable: false,
        }
    }
}

fn seat_reply(seat: Seat) -> MasterReply {
    MasterReply::Seat {
        room_key: seat.room_key,
        player_id: seat.player_id,
        player_name: seat.player_name,
        admission: seat.admission,
    }
}

fn error_kind(error: &RegistryError) -> ErrorKind {
    match error {
        RegistryError::Validation(_) => ErrorKind::Validation,
        RegistryError::CreateFailed(_) => ErrorKind::CreateFailed,
        RegistryError::NotFound(_) => ErrorKind::NotFound,
        RegistryError::NameTaken { .. } => ErrorKind::NameTaken,
        RegistryError::Rejected { .. } => ErrorKind::Rejected,
        RegistryError::Unreachable { .. } => ErrorKind::Unreachable,
        RegistryError::Runtime(_) => ErrorKind::Internal,
    }
}

/// Front ends get the outermost message plus the reason underneath it.
fn error_reply(error: &RegistryError) -> MasterReply {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = std::error::Error::source(cause);
    }
    MasterReply::Error {
        kind: error_kind(error),
        message,
        retryable: error.is_retryable(),
    }
}
