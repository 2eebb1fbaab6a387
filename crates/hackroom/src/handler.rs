//! Per-connection handler: decode requests, dispatch, reply.
//!
//! Each accepted connection gets its own Tokio task running this loop.
//! A connection may carry any number of requests, answered in order. It
//! ends when the peer closes it or stays idle past the idle timeout.

use std::sync::Arc;

use hackroom_protocol::{Codec, Request, Response};
use hackroom_transport::{Connection, WebSocketConnection};
use serde::Deserialize;

use crate::server::ServerState;
use crate::{HackroomError, RpcHandler};

/// Just the envelope's sequence number, for answering a request whose
/// call didn't decode.
#[derive(Deserialize)]
struct SeqOnly {
    #[serde(default)]
    seq: u64,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<H, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<H, C>>,
) -> Result<(), HackroomError>
where
    H: RpcHandler,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    loop {
        let data = match tokio::time::timeout(state.idle_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::debug!(%conn_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::debug!(%conn_id, "connection idle, closing");
                break;
            }
        };

        let response = match state.codec.decode::<Request<H::Call>>(&data) {
            Ok(request) => Response {
                seq: request.seq,
                reply: state.handler.handle(request.call).await,
            },
            Err(e) => {
                let seq = state
                    .codec
                    .decode::<SeqOnly>(&data)
                    .map(|s| s.seq)
                    .unwrap_or(0);
                tracing::debug!(%conn_id, seq, error = %e, "malformed request");
                Response {
                    seq,
                    reply: state.handler.malformed(&e),
                }
            }
        };

        let bytes = state.codec.encode(&response)?;
        conn.send(&bytes).await?;
    }

    Ok(())
}
