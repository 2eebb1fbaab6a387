//! `RpcServer` builder and accept loop.
//!
//! Both tiers run the same server: a room process serves an
//! [`EngineService`](crate::EngineService), the master serves a
//! [`MasterService`](crate::MasterService).

use std::sync::Arc;
use std::time::Duration;

use hackroom_protocol::{Codec, JsonCodec};
use hackroom_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{HackroomError, RpcHandler};

/// How long a connection may sit idle between requests.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<H, C> {
    pub(crate) handler: H,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting an [`RpcServer`].
///
/// # Example
///
/// ```rust,ignore
/// use hackroom::prelude::*;
///
/// let server = RpcServer::builder()
///     .bind("0.0.0.0:8000")
///     .build(EngineService::new(engine))
///     .await?;
/// server.run().await
/// ```
pub struct RpcServerBuilder {
    bind_addr: String,
    idle_timeout: Duration,
}

impl RpcServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Binds the listener and wraps `handler`, speaking JSON.
    ///
    /// # Errors
    /// [`HackroomError::Transport`] if the address can't be bound.
    pub async fn build<H: RpcHandler>(self, handler: H) -> Result<RpcServer<H>, HackroomError> {
        self.build_with_codec(handler, JsonCodec).await
    }

    /// # Errors
    /// See [`build`](Self::build).
    pub async fn build_with_codec<H: RpcHandler, C: Codec>(
        self,
        handler: H,
        codec: C,
    ) -> Result<RpcServer<H, C>, HackroomError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let state = Arc::new(ServerState {
            handler,
            codec,
            idle_timeout: self.idle_timeout,
        });
        Ok(RpcServer { transport, state })
    }
}

impl Default for RpcServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound RPC server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct RpcServer<H, C = JsonCodec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<H, C>>,
}

impl RpcServer<()> {
    pub fn builder() -> RpcServerBuilder {
        RpcServerBuilder::new()
    }
}

impl<H: RpcHandler, C: Codec> RpcServer<H, C> {
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    pub fn handler(&self) -> &H {
        &self.state.handler
    }

    /// Runs the accept loop, one task per connection, until the task is
    /// dropped or aborted.
    pub async fn run(mut self) -> Result<(), HackroomError> {
        let addr = self.local_addr().ok();
        tracing::info!(?addr, "rpc server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }
}
