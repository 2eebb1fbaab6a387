//! Remote calls from the master tier to room processes.
//!
//! - [`RoomGateway`] is the seam: one call, one attempt, to the room on a
//!   given host port. [`WebSocketGateway`] is the real one; tests plug
//!   in an in-process gateway instead.
//! - [`RoomClient`] adds typed calls on top of a gateway.
//! - [`RetryPolicy`] bounds and spaces out repeated attempts.

mod error;
mod gateway;
mod retry;
mod websocket;

pub use error::{GatewayError, RetryExhausted};
pub use gateway::{RoomClient, RoomGateway};
pub use retry::{Backoff, RetryPolicy};
pub use websocket::{DEFAULT_CALL_TIMEOUT, WebSocketGateway};
