//! The shared, lock-guarded engine a room process serves.

use hackroom_protocol::{
    Admission, GameStateView, PlayerId, PlayerName, RoomCall, RoomKey, RoomReply,
};
use tokio::sync::Mutex;

use crate::{EngineConfig, EngineError, GameState};

/// A room's engine, safe to share across connection tasks.
///
/// One process serves exactly one room, so there is exactly one of these
/// per process. Every call takes the same lock, which is what makes the
/// final admission, the role deal and the phase change a single step:
/// concurrent joiners either see the room before it filled up or the
/// finished, fully dealt room, never anything in between.
pub struct GameEngine {
    room_key: RoomKey,
    state: Mutex<GameState>,
}

impl GameEngine {
    /// Creates the engine for `room_key`.
    ///
    /// # Errors
    /// Returns an [`EngineError`] if `config` is invalid.
    pub fn new(room_key: RoomKey, config: EngineConfig) -> Result<Self, EngineError> {
        let state = GameState::new(room_key.clone(), config)?;
        tracing::info!(%room_key, capacity = state.capacity(), "room engine ready");
        Ok(Self {
            room_key,
            state: Mutex::new(state),
        })
    }

    pub fn room_key(&self) -> &RoomKey {
        &self.room_key
    }

    /// Admits the room's creator. Safe to retry.
    pub async fn create_room(
        &self,
        player_id: PlayerId,
        player_name: PlayerName,
    ) -> Admission {
        self.state.lock().await.create(player_id, player_name)
    }

    pub async fn join_room(
        &self,
        room_key: &RoomKey,
        player_id: PlayerId,
        player_name: PlayerName,
    ) -> Admission {
        self.state.lock().await.join(room_key, player_id, player_name)
    }

    pub async fn game_state(
        &self,
        room_key: Option<&RoomKey>,
        player_id: &PlayerId,
    ) -> Option<GameStateView> {
        self.state.lock().await.view(room_key, player_id)
    }

    /// A copy of the current state, for inspection.
    pub async fn snapshot(&self) -> GameState {
        self.state.lock().await.clone()
    }

    /// Dispatches one remote call.
    pub async fn handle(&self, call: RoomCall) -> RoomReply {
        match call {
            RoomCall::CreateRoom {
                player_id,
                player_name,
            } => RoomReply::Admission(self.create_room(player_id, player_name).await),
            RoomCall::JoinRoom {
                room_key,
                player_id,
                player_name,
            } => RoomReply::Admission(
                self.join_room(&room_key, player_id, player_name).await,
            ),
            RoomCall::GetGameState {
                room_key,
                player_id,
            } => RoomReply::GameState(
                self.game_state(room_key.as_ref(), &player_id).await,
            ),
        }
    }
}
