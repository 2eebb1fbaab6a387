//! Byte pipes between the master tier and room processes.
//!
//! A room process listens on one port. The master opens a connection
//! per call, sends one request and waits for one reply, then closes it.
//! Front ends talking to the master may keep a connection open and send
//! several requests over it; they are answered in order. Neither side
//! sees anything but whole messages.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket framing via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Tags a connection in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The listening side of an endpoint.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next caller.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    fn local_addr(&self) -> std::io::Result<std::net::SocketAddr>;
}

/// One open connection. Each `send` and each `recv` moves a whole
/// message.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// The next message, or `Ok(None)` once the peer has closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Tells the peer no more requests are coming.
    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;
}
