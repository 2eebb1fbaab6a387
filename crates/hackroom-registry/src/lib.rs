//! Master tier for hackroom.
//!
//! - [`PortAllocator`] owns the host port pool.
//! - [`ProcessRuntime`] starts and stops room processes;
//!   [`CommandRuntime`] runs them as child processes.
//! - [`RoomLauncher`] starts a room and retries the handshake until it
//!   answers.
//! - [`RoomRegistry`] ties it together: room keys, player ids, the cached
//!   roster of every room, and the create / join / query / close calls.
//!
//! ```text
//! RoomRegistry ─► RoomLauncher ─► ProcessRuntime
//!      │               │
//!      └───────────────┴──► RoomGateway ─► room process
//! ```

mod error;
mod launcher;
mod ports;
mod registry;
mod runtime;

pub use error::{LaunchError, PortError, RegistryError, RuntimeError};
pub use launcher::{Launched, RoomLauncher};
pub use ports::{PortAllocator, PortRange};
pub use registry::{Member, RegistryConfig, RoomRegistry, Seat};
pub use runtime::{
    next_handle, probe_bound_ports, CommandRuntime, LaunchSpec, ProcessHandle, ProcessRuntime,
    BIND_ENV, CONTAINER_PORT, ROOM_KEY_ENV,
};
