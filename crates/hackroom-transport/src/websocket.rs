//! WebSocket endpoints over `tokio-tungstenite`.
//!
//! Room processes and the master both listen with [`WebSocketTransport`];
//! the master's gateway dials rooms with [`WebSocketConnection::connect`].
//! Every request is a single binary frame, and so is every reply.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Connection, ConnectionId, Transport, TransportError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

fn ws_io(kind: io::ErrorKind, e: tungstenite::Error) -> io::Error {
    io::Error::new(kind, e)
}

/// Listens for callers on one address.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds `addr`. Port 0 picks a free port; see
    /// [`local_addr`](Transport::local_addr).
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::BindFailed {
                addr: addr.to_string(),
                source,
            })?;
        tracing::debug!(addr, "listening");
        Ok(Self { listener })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let ws = tokio_tungstenite::accept_async(MaybeTlsStream::Plain(stream))
            .await
            .map_err(|e| TransportError::AcceptFailed(ws_io(io::ErrorKind::InvalidData, e)))?;

        let conn = WebSocketConnection::from_stream(ws);
        tracing::debug!(id = %conn.id, %peer, "accepted connection");
        Ok(conn)
    }

    fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

type Stream = MaybeTlsStream<TcpStream>;

/// One WebSocket connection, accepted or dialed.
///
/// The read and write halves sit behind separate locks, so a reply can
/// be written while another task is parked in [`recv`](Connection::recv).
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WebSocketStream<Stream>, Message>>,
    stream: Mutex<SplitStream<WebSocketStream<Stream>>>,
}

impl WebSocketConnection {
    /// Dials a room or master at `addr` (`host:port`).
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let connect_failed = |source| TransportError::ConnectFailed {
            addr: addr.to_string(),
            source,
        };

        let tcp = TcpStream::connect(addr).await.map_err(connect_failed)?;
        let url = format!("ws://{addr}/");
        let (ws, _) = tokio_tungstenite::client_async(url, MaybeTlsStream::Plain(tcp))
            .await
            .map_err(|e| connect_failed(ws_io(io::ErrorKind::ConnectionRefused, e)))?;

        let conn = Self::from_stream(ws);
        tracing::trace!(id = %conn.id, addr, "dialed");
        Ok(conn)
    }

    fn from_stream(ws: WebSocketStream<Stream>) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id: next_id(),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        self.sink
            .lock()
            .await
            .send(Message::Binary(data.to_vec().into()))
            .await
            .map_err(|e| TransportError::SendFailed(ws_io(io::ErrorKind::BrokenPipe, e)))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Binary(data)) => return Ok(Some(data.into())),
                Ok(Message::Text(text)) => return Ok(Some(text.as_bytes().to_vec())),
                Ok(Message::Close(_)) => return Ok(None),
                // Pings are answered by tungstenite itself.
                Ok(_) => continue,
                Err(e) => {
                    return Err(TransportError::ReceiveFailed(ws_io(
                        io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
        Ok(None)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(ws_io(io::ErrorKind::BrokenPipe, e)))
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
