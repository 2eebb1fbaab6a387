//! # hackroom
//!
//! Players meet under a six-character room key; every room runs as its
//! own isolated process with its own game state.
//!
//! - The **master** ([`MasterService`] over a
//!   [`RoomRegistry`](hackroom_registry::RoomRegistry)) hands out room
//!   keys, player ids and ports, launches room processes and relays
//!   joins and state queries to them.
//! - A **room process** ([`EngineService`] over a
//!   [`GameEngine`](hackroom_engine::GameEngine)) seats players up to
//!   capacity, deals the roles once and starts the game.
//!
//! Both speak JSON requests over WebSocket through [`RpcServer`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hackroom::prelude::*;
//!
//! # async fn run() -> Result<(), HackroomError> {
//! let config = MasterConfig::default();
//! let runtime = InProcessRuntime::new(config.engine.clone());
//! let gateway = WebSocketGateway::new(config.room_host.clone());
//! let registry = RoomRegistry::start(config.registry_config(), runtime, gateway).await?;
//!
//! let server = RpcServer::builder()
//!     .bind(&config.listen_addr)
//!     .build(MasterService::new(registry))
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod runtime;
mod server;
mod service;

pub use config::{
    ConfigError, MasterConfig, RetrySettings, RoomProcessConfig, RuntimeKind, CAPACITY_ENV,
    CONFIG_ENV, DEFAULT_CONFIG_PATH, INSTRUCTIONS_ENV, ROLES_ENV,
};
pub use error::HackroomError;
pub use runtime::InProcessRuntime;
pub use server::{RpcServer, RpcServerBuilder, DEFAULT_IDLE_TIMEOUT};
pub use service::{EngineService, MasterService, RpcHandler};

/// Installs the `tracing` subscriber used by the binaries: `RUST_LOG`
/// when set, `info` otherwise.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Re-exports for building on hackroom.
pub mod prelude {
    pub use crate::{
        EngineService, HackroomError, InProcessRuntime, MasterConfig, MasterService,
        RoomProcessConfig, RpcHandler, RpcServer, RuntimeKind,
    };
    pub use hackroom_engine::{EngineConfig, GameEngine};
    pub use hackroom_gateway::{RetryPolicy, RoomGateway, WebSocketGateway};
    pub use hackroom_protocol::{
        Admission, GameStateView, MasterCall, MasterReply, Phase, PlayerId, PlayerName, Role,
        RoomCall, RoomKey, RoomReply,
    };
    pub use hackroom_registry::{
        CommandRuntime, PortRange, ProcessRuntime, RegistryConfig, RegistryError, RoomRegistry,
    };
}
