//! Engine configuration.

use hackroom_protocol::Role;
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Text shown to every player once roles are assigned.
pub const DEFAULT_INSTRUCTIONS: &str = "Roles are secret. Hackers know each other \
and are trying to breach the network. The Firewall and the Auditor must work out \
who the Hackers are before it is too late.";

/// Settings for one room's engine.
///
/// `capacity` and `roles` are independent values that happen to have the
/// same length in the reference setup. [`EngineConfig::validate`] insists
/// they match, since roles are dealt one per player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Players required before the game starts. Also the hard cap.
    pub capacity: usize,

    /// The role multiset dealt once the room is full.
    pub roles: Vec<Role>,

    /// Text embedded in the game-start admission and in state views.
    pub instructions: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: 3,
            roles: Role::ALL.to_vec(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }
}

impl EngineConfig {
    /// Checks that the config can actually run a room.
    ///
    /// # Errors
    /// - [`EngineError::ZeroCapacity`] if `capacity` is 0
    /// - [`EngineError::RoleCountMismatch`] if there isn't exactly one role
    ///   per seat
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.capacity == 0 {
            return Err(EngineError::ZeroCapacity);
        }
        if self.roles.len() != self.capacity {
            return Err(EngineError::RoleCountMismatch {
                roles: self.roles.len(),
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}
