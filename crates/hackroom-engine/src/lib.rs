//! Per-room game engine for hackroom.
//!
//! Each room runs in its own isolated process, and that process owns
//! one [`GameEngine`]: the roster, the secret roles, the alive set, and
//! the `setup → active` phase.
//!
//! # Key types
//!
//! - [`GameEngine`]: lock-guarded engine shared by connection tasks
//! - [`GameState`]: the underlying state machine
//! - [`EngineConfig`]: capacity, role set, instructions

mod config;
mod engine;
mod error;
mod state;

pub use config::{EngineConfig, DEFAULT_INSTRUCTIONS};
pub use engine::GameEngine;
pub use error::EngineError;
pub use state::GameState;
