//! One room's game process.
//!
//! Reads `ROOM_KEY` and `HACKROOM_BIND` from the environment, plus the
//! engine overrides `HACKROOM_CAPACITY`, `HACKROOM_ROLES` and
//! `HACKROOM_INSTRUCTIONS`, and serves that room's engine until killed.

use hackroom::prelude::*;

#[tokio::main]
async fn main() -> Result<(), HackroomError> {
    hackroom::init_tracing();

    let config = RoomProcessConfig::from_env()?;
    let engine = GameEngine::new(config.room_key.clone(), config.engine)?;
    let server = RpcServer::builder()
        .bind(&config.bind_addr)
        .build(EngineService::new(engine))
        .await?;

    tracing::info!(room_key = %config.room_key, addr = %config.bind_addr, "room process up");
    server.run().await
}
