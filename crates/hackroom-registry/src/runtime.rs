//! Starting and stopping isolated room processes.
//!
//! [`ProcessRuntime`] stands in for whatever actually runs a room: a
//! container engine, a process supervisor, or a task in this process.
//! The registry only needs three things from it, so that is all the
//! trait asks for.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use hackroom_protocol::RoomKey;
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::{PortRange, RuntimeError};

/// Environment variable carrying the room key into a room process.
pub const ROOM_KEY_ENV: &str = "ROOM_KEY";

/// Environment variable carrying the listen address into a room process.
pub const BIND_ENV: &str = "HACKROOM_BIND";

/// Port a room process listens on inside its isolation boundary.
pub const CONTAINER_PORT: u16 = 8000;

/// What to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub room_key: RoomKey,
    /// Port reachable from the master tier.
    pub host_port: u16,
    /// Port the room binds inside its container. Runtimes without port
    /// mapping bind `host_port` directly.
    pub container_port: u16,
}

/// Opaque reference to a started room process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessHandle(u64);

impl ProcessHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc-{}", self.0)
    }
}

/// Runs room processes.
pub trait ProcessRuntime: Send + Sync + 'static {
    /// Starts a room process. Returning doesn't mean the room is
    /// reachable yet; that is what the handshake is for.
    fn start(
        &self,
        spec: &LaunchSpec,
    ) -> impl Future<Output = Result<ProcessHandle, RuntimeError>> + Send;

    fn stop(&self, handle: ProcessHandle) -> impl Future<Output = Result<(), RuntimeError>> + Send;

    /// Ports in `range` some earlier room process still holds.
    fn bound_ports(
        &self,
        range: PortRange,
    ) -> impl Future<Output = Result<Vec<u16>, RuntimeError>> + Send;
}

/// Ports in `range` on `host` that can't be bound right now.
pub async fn probe_bound_ports(host: &str, range: PortRange) -> Vec<u16> {
    let mut bound = Vec::new();
    for port in range.ports() {
        if TcpListener::bind((host, port)).await.is_err() {
            bound.push(port);
        }
    }
    if !bound.is_empty() {
        tracing::info!(host, count = bound.len(), ?bound, "ports already bound");
    }
    bound
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Hands out process-unique [`ProcessHandle`]s.
pub fn next_handle() -> ProcessHandle {
    ProcessHandle::new(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
}

/// Runs each room as a child process of the master.
///
/// The program gets the room key in `ROOM_KEY` and its listen address
/// in `HACKROOM_BIND` (`{bind_host}:{host_port}`), plus anything added
/// with [`with_envs`](Self::with_envs). Children are killed when stopped
/// or when the runtime is dropped.
pub struct CommandRuntime {
    program: PathBuf,
    bind_host: String,
    envs: Vec<(String, String)>,
    children: Mutex<HashMap<ProcessHandle, Child>>,
}

impl CommandRuntime {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            bind_host: "127.0.0.1".to_string(),
            envs: Vec::new(),
            children: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    /// Extra variables set on every room process, such as engine settings.
    pub fn with_envs<K, V>(mut self, envs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.envs
            .extend(envs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    fn command(&self, spec: &LaunchSpec) -> Command {
        let mut command = Command::new(&self.program);
        command
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(ROOM_KEY_ENV, spec.room_key.as_str())
            .env(BIND_ENV, format!("{}:{}", self.bind_host, spec.host_port))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    pub async fn running(&self) -> usize {
        self.children.lock().await.len()
    }
}

impl ProcessRuntime for CommandRuntime {
    async fn start(&self, spec: &LaunchSpec) -> Result<ProcessHandle, RuntimeError> {
        let child = self
            .command(spec)
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                room_key: spec.room_key.clone(),
                port: spec.host_port,
                source,
            })?;

        let handle = next_handle();
        tracing::info!(
            room_key = %spec.room_key,
            port = spec.host_port,
            %handle,
            pid = child.id(),
            program = %self.program.display(),
            "spawned room process"
        );
        self.children.lock().await.insert(handle, child);
        Ok(handle)
    }

    async fn stop(&self, handle: ProcessHandle) -> Result<(), RuntimeError> {
        let child = self.children.lock().await.remove(&handle);
        let Some(mut child) = child else {
            return Err(RuntimeError::UnknownProcess(handle));
        };
        child
            .kill()
            .await
            .map_err(|source| RuntimeError::Stop { handle, source })?;
        tracing::info!(%handle, "room process stopped");
        Ok(())
    }

    async fn bound_ports(&self, range: PortRange) -> Result<Vec<u16>, RuntimeError> {
        Ok(probe_bound_ports(&self.bind_host, range).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_bound_ports_finds_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let bound = probe_bound_ports("127.0.0.1", PortRange::new(port, port)).await;
        assert_eq!(bound, vec![port]);

        drop(listener);
        let bound = probe_bound_ports("127.0.0.1", PortRange::new(port, port)).await;
        assert!(bound.is_empty());
    }

    #[tokio::test]
    async fn test_command_runtime_missing_program_is_spawn_error() {
        let runtime = CommandRuntime::new("/nonexistent/hackroom-room");
        let spec = LaunchSpec {
            room_key: RoomKey::parse("AB12CD").unwrap(),
            host_port: 8001,
            container_port: CONTAINER_PORT,
        };

        let err = runtime.start(&spec).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn { port: 8001, .. }));
        assert_eq!(runtime.running().await, 0);
    }

    #[test]
    fn test_command_passes_room_and_extra_env() {
        let runtime = CommandRuntime::new("hackroom-room")
            .with_envs([("HACKROOM_CAPACITY", "5"), ("ROOM_KEY", "ignored")]);
        let spec = LaunchSpec {
            room_key: RoomKey::parse("AB12CD").unwrap(),
            host_port: 8042,
            container_port: CONTAINER_PORT,
        };

        let command = runtime.command(&spec);
        let envs: HashMap<String, Option<String>> = command
            .as_std()
            .get_envs()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.map(|v| v.to_string_lossy().into_owned()),
                )
            })
            .collect();
        assert_eq!(envs["HACKROOM_CAPACITY"].as_deref(), Some("5"));
        assert_eq!(envs[ROOM_KEY_ENV].as_deref(), Some("AB12CD"));
        assert_eq!(envs[BIND_ENV].as_deref(), Some("127.0.0.1:8042"));
    }

    #[tokio::test]
    async fn test_command_runtime_stop_unknown_handle() {
        let runtime = CommandRuntime::new("hackroom-room");
        let err = runtime.stop(ProcessHandle::new(999)).await.unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownProcess(_)));
    }

    #[test]
    fn test_process_handle_display() {
        assert_eq!(ProcessHandle::new(4).to_string(), "proc-4");
    }
}
