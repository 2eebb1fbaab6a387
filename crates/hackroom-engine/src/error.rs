//! Error types for the engine layer.

/// Errors raised while setting up a room's engine.
///
/// Admission rejections are not errors here: they are ordinary
/// [`Admission`](hackroom_protocol::Admission) outcomes.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A room needs at least one seat.
    #[error("room capacity must be at least 1")]
    ZeroCapacity,

    /// Roles are dealt one per seat, so the counts must agree.
    #[error("{roles} roles configured for a capacity of {capacity}")]
    RoleCountMismatch { roles: usize, capacity: usize },
}
