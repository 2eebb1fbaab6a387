//! The master tier's table of live rooms.

use std::collections::{HashMap, HashSet};

use hackroom_gateway::{RetryPolicy, RoomClient, RoomGateway};
use hackroom_protocol::{
    new_player_id, new_room_key, Admission, GameStateView, PlayerId, PlayerName, RoomKey,
};
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::{
    LaunchError, Launched, PortAllocator, PortRange, ProcessHandle, ProcessRuntime,
    RegistryError, RoomLauncher, CONTAINER_PORT,
};

/// Registry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub ports: PortRange,
    /// Readiness handshake after a room process starts.
    pub handshake: RetryPolicy,
    /// State queries against running rooms.
    pub query: RetryPolicy,
    /// Join calls. Safe to repeat: a room answers a repeated join for
    /// the same id and name with the player's current admission.
    pub join: RetryPolicy,
    pub container_port: u16,
    /// Room keys tried before room creation gives up on collisions.
    pub key_attempts: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ports: PortRange::default(),
            handshake: RetryPolicy::handshake(),
            query: RetryPolicy::query(),
            join: RetryPolicy::query(),
            container_port: CONTAINER_PORT,
            key_attempts: 16,
        }
    }
}

/// A player's place in a room, as the front end should remember it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub room_key: RoomKey,
    pub player_id: PlayerId,
    pub player_name: PlayerName,
    pub admission: Admission,
}

/// A roster entry the registry has seen admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: PlayerId,
    pub name: PlayerName,
}

#[derive(Debug)]
struct RoomRecord {
    port: u16,
    handle: ProcessHandle,
    /// Mirrors the engine's roster; the engine stays authoritative.
    roster: Vec<Member>,
    /// Ids this room may hold without the registry having seen it admit
    /// them: joins whose reply never arrived, or ids the room reported
    /// as already in use. Never reissued while the room lives.
    held_ids: HashSet<PlayerId>,
}

impl RoomRecord {
    fn has_name(&self, name: &PlayerName) -> bool {
        self.roster.iter().any(|m| &m.name == name)
    }
}

#[derive(Debug)]
struct Inner {
    rooms: HashMap<RoomKey, RoomRecord>,
    ports: PortAllocator,
    /// Keys of rooms still launching.
    pending_keys: HashSet<RoomKey>,
    /// Ids handed to callers whose room call is still in flight.
    reserved_ids: HashSet<PlayerId>,
}

impl Inner {
    fn new(ports: PortAllocator) -> Self {
        Self {
            rooms: HashMap::new(),
            ports,
            pending_keys: HashSet::new(),
            reserved_ids: HashSet::new(),
        }
    }

    /// Every id in use by any room, including reservations.
    fn ids_in_use(&self) -> HashSet<PlayerId> {
        self.rooms
            .values()
            .flat_map(|room| {
                room.roster
                    .iter()
                    .map(|m| m.id.clone())
                    .chain(room.held_ids.iter().cloned())
            })
            .chain(self.reserved_ids.iter().cloned())
            .collect()
    }

    fn reserve_id(&mut self) -> PlayerId {
        let id = new_player_id(&self.ids_in_use());
        self.reserved_ids.insert(id.clone());
        id
    }

    /// Keeps `player_id` out of circulation for as long as `room_key` lives.
    fn hold_id(&mut self, room_key: &RoomKey, player_id: PlayerId) {
        if let Some(room) = self.rooms.get_mut(room_key) {
            room.held_ids.insert(player_id);
        }
    }

    fn fresh_key(&self, attempts: u32) -> Option<RoomKey> {
        (0..attempts.max(1))
            .map(|_| new_room_key())
            .find(|key| !self.rooms.contains_key(key) && !self.pending_keys.contains(key))
    }
}

/// Authoritative mapping from room key to port, process and roster.
///
/// One lock covers the whole table, the port pool and id reservation, so
/// two callers never get the same id or port. The lock is never held
/// while a room is being called: state is read and reserved under the
/// lock, the lock is dropped for the call, and re-taken to commit what
/// the room answered.
pub struct RoomRegistry<R, G> {
    config: RegistryConfig,
    launcher: RoomLauncher<R, G>,
    inner: Mutex<Inner>,
}

impl<R: ProcessRuntime, G: RoomGateway> RoomRegistry<R, G> {
    /// A registry whose whole port range starts out free.
    pub fn new(config: RegistryConfig, runtime: R, gateway: G) -> Self {
        let ports = PortAllocator::new(config.ports);
        Self::with_ports(config, runtime, gateway, ports)
    }

    /// Like [`new`](Self::new), but first asks `runtime` which ports are
    /// still held by earlier room processes and keeps them out of the pool.
    ///
    /// # Errors
    /// [`RegistryError::Runtime`] if the runtime can't report its ports.
    pub async fn start(config: RegistryConfig, runtime: R, gateway: G) -> Result<Self, RegistryError> {
        let bound = runtime.bound_ports(config.ports).await?;
        let ports = PortAllocator::reconciled(config.ports, bound);
        tracing::info!(
            start = config.ports.start,
            end = config.ports.end,
            free = ports.free_count(),
            "room registry started"
        );
        Ok(Self::with_ports(config, runtime, gateway, ports))
    }

    fn with_ports(config: RegistryConfig, runtime: R, gateway: G, ports: PortAllocator) -> Self {
        let launcher = RoomLauncher::new(runtime, gateway, config.handshake, config.container_port);
        Self {
            config,
            launcher,
            inner: Mutex::new(Inner::new(ports)),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn launcher(&self) -> &RoomLauncher<R, G> {
        &self.launcher
    }

    /// Creates a room and seats `player_name` as its first player.
    ///
    /// # Errors
    /// [`RegistryError::Validation`] for a bad name. Anything that goes
    /// wrong bringing the room up is [`RegistryError::CreateFailed`]; in
    /// that case no room is recorded and the port is back in the pool.
    pub async fn create_room(&self, player_name: &str) -> Result<Seat, RegistryError> {
        let player_name = PlayerName::parse(player_name)?;

        let (room_key, player_id, port) = {
            let mut inner = self.inner.lock().await;
            let room_key = inner.fresh_key(self.config.key_attempts).ok_or(
                RegistryError::CreateFailed(LaunchError::NoFreeKey {
                    attempts: self.config.key_attempts,
                }),
            )?;
            let port = inner.ports.acquire().map_err(|e| {
                tracing::warn!(error = %e, "cannot create room");
                RegistryError::CreateFailed(e.into())
            })?;
            let player_id = inner.reserve_id();
            inner.pending_keys.insert(room_key.clone());
            (room_key, player_id, port)
        };

        tracing::info!(%room_key, port, %player_id, "launching room");
        let launched = self
            .launcher
            .launch(&room_key, port, &player_id, &player_name)
            .await;

        let mut inner = self.inner.lock().await;
        inner.pending_keys.remove(&room_key);
        inner.reserved_ids.remove(&player_id);

        match launched {
            Ok(Launched {
                port,
                handle,
                admission,
            }) => {
                inner.rooms.insert(
                    room_key.clone(),
                    RoomRecord {
                        port,
                        handle,
                        roster: vec![Member {
                            id: player_id.clone(),
                            name: player_name.clone(),
                        }],
                        held_ids: HashSet::new(),
                    },
                );
                tracing::info!(%room_key, port, %handle, rooms = inner.rooms.len(), "room created");
                Ok(Seat {
                    room_key,
                    player_id,
                    player_name,
                    admission,
                })
            }
            Err(e) => {
                if let Err(release) = inner.ports.release(port) {
                    tracing::error!(%room_key, port, error = %release, "port release after failed launch");
                }
                tracing::error!(%room_key, port, error = %e, "room creation failed");
                Err(RegistryError::CreateFailed(e))
            }
        }
    }

    /// Seats `player_name` in an existing room.
    ///
    /// The key is trimmed and upper-cased first. Only a join the room
    /// actually admitted is added to the cached roster. A join whose
    /// reply is lost is retried under the join policy with the same id;
    /// if it never gets an answer the id stays held by the room, since
    /// the room may have seated it.
    ///
    /// # Errors
    /// [`RegistryError::Validation`], [`RegistryError::NotFound`],
    /// [`RegistryError::NameTaken`], [`RegistryError::Rejected`] when the
    /// room turns the player away, or [`RegistryError::Unreachable`].
    pub async fn join_room(&self, room_key: &str, player_name: &str) -> Result<Seat, RegistryError> {
        let room_key = RoomKey::parse(room_key)?;
        let player_name = PlayerName::parse(player_name)?;

        let (port, mut player_id) = {
            let mut inner = self.inner.lock().await;
            let room = inner
                .rooms
                .get(&room_key)
                .ok_or_else(|| RegistryError::NotFound(room_key.clone()))?;
            if room.has_name(&player_name) {
                return Err(RegistryError::NameTaken {
                    room_key,
                    name: player_name,
                });
            }
            let port = room.port;
            (port, inner.reserve_id())
        };

        let client = RoomClient::new(self.launcher.gateway(), port);
        let mut id_attempts = 0;
        loop {
            id_attempts += 1;
            let result = self
                .config
                .join
                .run("join_room", |_| {
                    client.join_room(&room_key, &player_id, &player_name)
                })
                .instrument(tracing::info_span!("join_room", %room_key, port, %player_id))
                .await;

            let mut inner = self.inner.lock().await;
            inner.reserved_ids.remove(&player_id);

            return match result {
                Ok(admission) if admission.is_admitted() => {
                    match inner.rooms.get_mut(&room_key) {
                        Some(room) => room.roster.push(Member {
                            id: player_id.clone(),
                            name: player_name.clone(),
                        }),
                        None => tracing::warn!(%room_key, %player_id, "room closed during join"),
                    }
                    tracing::info!(%room_key, port, %player_id, %admission, "player joined");
                    Ok(Seat {
                        room_key,
                        player_id,
                        player_name,
                        admission,
                    })
                }
                Ok(Admission::IdInUse) if id_attempts < self.config.key_attempts.max(1) => {
                    tracing::warn!(%room_key, %player_id, "room already holds id, trying another");
                    inner.hold_id(&room_key, player_id);
                    player_id = inner.reserve_id();
                    continue;
                }
                Ok(Admission::NameInUse) => Err(RegistryError::NameTaken {
                    room_key,
                    name: player_name,
                }),
                Ok(admission) => {
                    if admission == Admission::IdInUse {
                        inner.hold_id(&room_key, player_id);
                    }
                    tracing::info!(%room_key, port, %admission, "join rejected");
                    Err(RegistryError::Rejected {
                        room_key,
                        admission,
                    })
                }
                Err(source) => {
                    tracing::warn!(%room_key, port, %player_id, "join outcome unknown, holding id");
                    inner.hold_id(&room_key, player_id);
                    Err(RegistryError::Unreachable { room_key, source })
                }
            };
        }
    }

    /// The room's view for `player_id`.
    ///
    /// `Ok(None)` means the room or the player is unknown.
    ///
    /// # Errors
    /// [`RegistryError::Validation`] for a malformed key, or
    /// [`RegistryError::Unreachable`] once the query policy runs out.
    pub async fn query_state(
        &self,
        room_key: &str,
        player_id: &PlayerId,
    ) -> Result<Option<GameStateView>, RegistryError> {
        let room_key = RoomKey::parse(room_key)?;
        let Some(port) = self.port_of(&room_key).await else {
            tracing::debug!(%room_key, "state query for unknown room");
            return Ok(None);
        };

        let client = RoomClient::new(self.launcher.gateway(), port);
        let result = self
            .config
            .query
            .run("query_state", |_| client.game_state(&room_key, player_id))
            .instrument(tracing::debug_span!("query_state", %room_key, port, %player_id))
            .await;
        result.map_err(|source| RegistryError::Unreachable { room_key, source })
    }

    /// Tears a room down: forgets it, stops its process, frees its port.
    ///
    /// # Errors
    /// [`RegistryError::Validation`] or [`RegistryError::NotFound`].
    pub async fn close_room(&self, room_key: &str) -> Result<RoomKey, RegistryError> {
        let room_key = RoomKey::parse(room_key)?;
        let room = self
            .inner
            .lock()
            .await
            .rooms
            .remove(&room_key)
            .ok_or_else(|| RegistryError::NotFound(room_key.clone()))?;

        self.launcher.teardown(room.handle).await;

        let mut inner = self.inner.lock().await;
        if let Err(e) = inner.ports.release(room.port) {
            tracing::error!(%room_key, port = room.port, error = %e, "port release on close");
        }
        tracing::info!(%room_key, port = room.port, players = room.roster.len(), "room closed");
        Ok(room_key)
    }

    pub async fn room_count(&self) -> usize {
        self.inner.lock().await.rooms.len()
    }

    pub async fn port_of(&self, room_key: &RoomKey) -> Option<u16> {
        self.inner.lock().await.rooms.get(room_key).map(|r| r.port)
    }

    /// The cached roster of `room_key`, in join order.
    pub async fn players(&self, room_key: &RoomKey) -> Option<Vec<Member>> {
        self.inner
            .lock()
            .await
            .rooms
            .get(room_key)
            .map(|r| r.roster.clone())
    }

    pub async fn free_ports(&self) -> usize {
        self.inner.lock().await.ports.free_count()
    }
}
