//! Bringing a room process up and confirming it answers.

use hackroom_gateway::{RetryPolicy, RoomClient, RoomGateway};
use hackroom_protocol::{Admission, PlayerId, PlayerName, RoomKey};
use tracing::Instrument;

use crate::{LaunchError, LaunchSpec, ProcessHandle, ProcessRuntime};

/// A room that is up and has seated its creator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launched {
    pub port: u16,
    pub handle: ProcessHandle,
    pub admission: Admission,
}

/// Starts room processes and runs the readiness handshake.
///
/// The handshake is the creator's own `create_room` call, repeated under
/// the handshake [`RetryPolicy`] until the room answers. Port selection
/// is left to the caller, which holds the port pool.
pub struct RoomLauncher<R, G> {
    runtime: R,
    gateway: G,
    handshake: RetryPolicy,
    container_port: u16,
}

impl<R: ProcessRuntime, G: RoomGateway> RoomLauncher<R, G> {
    pub fn new(runtime: R, gateway: G, handshake: RetryPolicy, container_port: u16) -> Self {
        Self {
            runtime,
            gateway,
            handshake,
            container_port,
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Starts `room_key` on `port` and seats its creator.
    ///
    /// If the handshake never succeeds, or the room turns the creator
    /// away, the process is stopped before returning. A failed stop is
    /// logged and otherwise ignored.
    ///
    /// # Errors
    /// [`LaunchError::Start`], [`LaunchError::Handshake`] or
    /// [`LaunchError::Rejected`].
    pub async fn launch(
        &self,
        room_key: &RoomKey,
        port: u16,
        player_id: &PlayerId,
        player_name: &PlayerName,
    ) -> Result<Launched, LaunchError> {
        let spec = LaunchSpec {
            room_key: room_key.clone(),
            host_port: port,
            container_port: self.container_port,
        };

        let handle = match self.runtime.start(&spec).await {
            Ok(handle) => handle,
            Err(source) => {
                tracing::error!(%room_key, port, error = %source, "room process failed to start");
                return Err(LaunchError::Start {
                    room_key: room_key.clone(),
                    port,
                    source,
                });
            }
        };

        let client = RoomClient::new(&self.gateway, port);
        let handshake = self
            .handshake
            .run("handshake", |attempt| {
                tracing::debug!(attempt, "handshake attempt");
                client.create_room(player_id, player_name)
            })
            .instrument(tracing::info_span!("handshake", %room_key, port, %handle))
            .await;

        match handshake {
            Ok(admission) if admission.is_admitted() => {
                tracing::info!(%room_key, port, %handle, "room ready");
                Ok(Launched {
                    port,
                    handle,
                    admission,
                })
            }
            Ok(admission) => {
                tracing::error!(%room_key, port, %admission, "room refused its creator");
                self.teardown(handle).await;
                Err(LaunchError::Rejected {
                    room_key: room_key.clone(),
                    admission,
                })
            }
            Err(source) => {
                tracing::error!(
                    %room_key,
                    port,
                    attempts = source.attempts,
                    error = %source.last,
                    "room never became reachable"
                );
                self.teardown(handle).await;
                Err(LaunchError::Handshake {
                    room_key: room_key.clone(),
                    port,
                    source,
                })
            }
        }
    }

    /// Stops a room process, logging instead of failing.
    pub async fn teardown(&self, handle: ProcessHandle) {
        if let Err(e) = self.runtime.stop(handle).await {
            tracing::warn!(%handle, error = %e, "failed to stop room process");
        }
    }
}
