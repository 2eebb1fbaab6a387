//! [`RoomGateway`] over one short-lived WebSocket connection per call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hackroom_protocol::{Codec, JsonCodec, Request, Response, RoomCall, RoomReply};
use hackroom_transport::{Connection, WebSocketConnection};
use serde::{de::DeserializeOwned, Serialize};

use crate::{GatewayError, RoomGateway};

/// How long a single call may take, connect to reply, by default.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects to `host:port`, sends one [`Request`], waits for its
/// [`Response`] and closes.
///
/// Also used by clients of the master tier through [`request`](Self::request).
#[derive(Debug)]
pub struct WebSocketGateway<C = JsonCodec> {
    host: String,
    call_timeout: Duration,
    codec: C,
    next_seq: AtomicU64,
}

impl WebSocketGateway<JsonCodec> {
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_codec(host, JsonCodec)
    }
}

impl<C: Codec> WebSocketGateway<C> {
    pub fn with_codec(host: impl Into<String>, codec: C) -> Self {
        Self {
            host: host.into(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            codec,
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Sends `call` to `addr` and decodes the matching reply.
    ///
    /// # Errors
    /// [`GatewayError::Timeout`] if the whole exchange takes longer than
    /// the call timeout, otherwise whatever the exchange failed with.
    pub async fn request<Call, Reply>(&self, addr: &str, call: Call) -> Result<Reply, GatewayError>
    where
        Call: Serialize + Send,
        Reply: DeserializeOwned,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let exchange = self.exchange(addr, Request { seq, call });
        match tokio::time::timeout(self.call_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout {
                addr: addr.to_string(),
                after: self.call_timeout,
            }),
        }
    }

    async fn exchange<Call, Reply>(
        &self,
        addr: &str,
        request: Request<Call>,
    ) -> Result<Reply, GatewayError>
    where
        Call: Serialize,
        Reply: DeserializeOwned,
    {
        let bytes = self.codec.encode(&request)?;
        let conn = WebSocketConnection::connect(addr).await?;
        conn.send(&bytes).await?;

        let Some(raw) = conn.recv().await? else {
            return Err(GatewayError::Closed {
                addr: addr.to_string(),
            });
        };
        if let Err(e) = conn.close().await {
            tracing::trace!(addr, error = %e, "close after reply failed");
        }

        let response: Response<Reply> = self.codec.decode(&raw)?;
        if response.seq != request.seq {
            return Err(GatewayError::SequenceMismatch {
                expected: request.seq,
                got: response.seq,
            });
        }
        Ok(response.reply)
    }
}

impl<C: Codec> RoomGateway for WebSocketGateway<C> {
    async fn call(&self, port: u16, call: RoomCall) -> Result<RoomReply, GatewayError> {
        let addr = format!("{}:{port}", self.host);
        tracing::debug!(addr, ?call, "room call");
        let reply: RoomReply = self.request(&addr, call).await?;
        match reply {
            RoomReply::Error { message } => Err(GatewayError::Remote(message)),
            reply => Ok(reply),
        }
    }
}
