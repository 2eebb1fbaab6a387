//! Rooms as tasks inside the master process.

use std::collections::HashMap;

use hackroom_engine::{EngineConfig, GameEngine};
use hackroom_registry::{
    next_handle, probe_bound_ports, LaunchSpec, PortRange, ProcessHandle, ProcessRuntime,
    RuntimeError,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::{EngineService, RpcServer};

/// A [`ProcessRuntime`] that serves each room from a task in this
/// process, on the room's host port.
///
/// Rooms share the process but not state: each task owns its engine and
/// is reached over the network like any other room. Handy for
/// single-binary development and end-to-end tests.
pub struct InProcessRuntime {
    bind_host: String,
    engine: EngineConfig,
    rooms: Mutex<HashMap<ProcessHandle, JoinHandle<()>>>,
}

impl InProcessRuntime {
    pub fn new(engine: EngineConfig) -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            engine,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    pub async fn running(&self) -> usize {
        self.rooms.lock().await.len()
    }
}

impl ProcessRuntime for InProcessRuntime {
    async fn start(&self, spec: &LaunchSpec) -> Result<ProcessHandle, RuntimeError> {
        let spawn_error = |e: crate::HackroomError| RuntimeError::Spawn {
            room_key: spec.room_key.clone(),
            port: spec.host_port,
            source: std::io::Error::other(e),
        };

        let engine = GameEngine::new(spec.room_key.clone(), self.engine.clone())
            .map_err(|e| spawn_error(e.into()))?;
        let server = RpcServer::builder()
            .bind(&format!("{}:{}", self.bind_host, spec.host_port))
            .build(EngineService::new(engine))
            .await
            .map_err(spawn_error)?;

        let handle = next_handle();
        let room_key = spec.room_key.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = server.run().await {
                tracing::warn!(%room_key, error = %e, "in-process room stopped");
            }
        });
        tracing::info!(room_key = %spec.room_key, port = spec.host_port, %handle, "room task started");
        self.rooms.lock().await.insert(handle, task);
        Ok(handle)
    }

    async fn stop(&self, handle: ProcessHandle) -> Result<(), RuntimeError> {
        let task = self
            .rooms
            .lock()
            .await
            .remove(&handle)
            .ok_or(RuntimeError::UnknownProcess(handle))?;
        task.abort();
        tracing::info!(%handle, "room task stopped");
        Ok(())
    }

    async fn bound_ports(&self, range: PortRange) -> Result<Vec<u16>, RuntimeError> {
        Ok(probe_bound_ports(&self.bind_host, range).await)
    }
}

impl Drop for InProcessRuntime {
    fn drop(&mut self) {
        for (_, task) in self.rooms.get_mut().drain() {
            task.abort();
        }
    }
}
