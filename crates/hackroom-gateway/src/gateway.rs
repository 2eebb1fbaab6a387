//! The seam between the master tier and room processes.

use std::future::Future;

use hackroom_protocol::{Admission, GameStateView, PlayerId, PlayerName, RoomCall, RoomKey, RoomReply};

use crate::GatewayError;

/// Delivers one [`RoomCall`] to the room process listening on `port`.
///
/// Implementations make exactly one attempt; retrying is the caller's
/// business (see [`RetryPolicy`](crate::RetryPolicy)).
pub trait RoomGateway: Send + Sync + 'static {
    fn call(
        &self,
        port: u16,
        call: RoomCall,
    ) -> impl Future<Output = Result<RoomReply, GatewayError>> + Send;
}

impl<G: RoomGateway> RoomGateway for std::sync::Arc<G> {
    fn call(
        &self,
        port: u16,
        call: RoomCall,
    ) -> impl Future<Output = Result<RoomReply, GatewayError>> + Send {
        (**self).call(port, call)
    }
}

/// Typed calls against one room, on top of a [`RoomGateway`].
#[derive(Debug, Clone, Copy)]
pub struct RoomClient<'a, G> {
    gateway: &'a G,
    port: u16,
}

impl<'a, G: RoomGateway> RoomClient<'a, G> {
    pub fn new(gateway: &'a G, port: u16) -> Self {
        Self { gateway, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Asks the room to admit its creator.
    pub async fn create_room(
        &self,
        player_id: &PlayerId,
        player_name: &PlayerName,
    ) -> Result<Admission, GatewayError> {
        let reply = self
            .gateway
            .call(
                self.port,
                RoomCall::CreateRoom {
                    player_id: player_id.clone(),
                    player_name: player_name.clone(),
                },
            )
            .await?;
        expect_admission(reply)
    }

    pub async fn join_room(
        &self,
        room_key: &RoomKey,
        player_id: &PlayerId,
        player_name: &PlayerName,
    ) -> Result<Admission, GatewayError> {
        let reply = self
            .gateway
            .call(
                self.port,
                RoomCall::JoinRoom {
                    room_key: room_key.clone(),
                    player_id: player_id.clone(),
                    player_name: player_name.clone(),
                },
            )
            .await?;
        expect_admission(reply)
    }

    /// `Ok(None)` means the room has no such player.
    pub async fn game_state(
        &self,
        room_key: &RoomKey,
        player_id: &PlayerId,
    ) -> Result<Option<GameStateView>, GatewayError> {
        let reply = self
            .gateway
            .call(
                self.port,
                RoomCall::GetGameState {
                    room_key: Some(room_key.clone()),
                    player_id: player_id.clone(),
                },
            )
            .await?;
        match reply {
            RoomReply::GameState(view) => Ok(view),
            other => Err(unexpected("game_state", other)),
        }
    }
}

fn expect_admission(reply: RoomReply) -> Result<Admission, GatewayError> {
    match reply {
        RoomReply::Admission(admission) => Ok(admission),
        other => Err(unexpected("admission", other)),
    }
}

fn unexpected(expected: &'static str, got: RoomReply) -> GatewayError {
    match got {
        RoomReply::Error { message } => GatewayError::Remote(message),
        other => GatewayError::UnexpectedReply {
            expected,
            got: format!("{other:?}"),
        },
    }
}
