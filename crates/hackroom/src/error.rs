//! Unified error type for hackroom.

use hackroom_engine::EngineError;
use hackroom_gateway::GatewayError;
use hackroom_protocol::ProtocolError;
use hackroom_registry::{RegistryError, RuntimeError};
use hackroom_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The binaries and the RPC server deal with this single type; `?`
/// converts sub-crate errors through the `#[from]` impls.
#[derive(Debug, thiserror::Error)]
pub enum HackroomError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
