//! Integration tests for `RoomRegistry` against in-process rooms.
//!
//! `FakeRuntime` "starts" a room by creating a real `GameEngine` and
//! registering it under the host port; `LocalGateway` routes calls to
//! those engines and can be told to fail.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hackroom_engine::{EngineConfig, GameEngine};
use hackroom_gateway::{GatewayError, RetryPolicy, RoomGateway};
use hackroom_protocol::{Admission, Phase, PlayerId, PlayerName, RoomCall, RoomKey, RoomReply};
use hackroom_registry::{
    next_handle, LaunchError, LaunchSpec, PortError, PortRange, ProcessHandle, ProcessRuntime,
    RegistryConfig, RegistryError, RoomRegistry, RuntimeError,
};

// =========================================================================
// Fakes
// =========================================================================

type Engines = Arc<Mutex<HashMap<u16, Arc<GameEngine>>>>;

#[derive(Default)]
struct FakeRuntime {
    engines: Engines,
    fail_start: AtomicBool,
    bound: Vec<u16>,
    running: Mutex<HashMap<ProcessHandle, u16>>,
    stopped: Mutex<Vec<ProcessHandle>>,
}

impl FakeRuntime {
    fn running(&self) -> usize {
        self.running.lock().unwrap().len()
    }

    fn stopped(&self) -> usize {
        self.stopped.lock().unwrap().len()
    }
}

impl ProcessRuntime for FakeRuntime {
    async fn start(&self, spec: &LaunchSpec) -> Result<ProcessHandle, RuntimeError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(RuntimeError::Spawn {
                room_key: spec.room_key.clone(),
                port: spec.host_port,
                source: std::io::Error::other("no runtime"),
            });
        }
        let engine = GameEngine::new(spec.room_key.clone(), EngineConfig::default())
            .expect("default config is valid");
        self.engines
            .lock()
            .unwrap()
            .insert(spec.host_port, Arc::new(engine));

        let handle = next_handle();
        self.running.lock().unwrap().insert(handle, spec.host_port);
        Ok(handle)
    }

    async fn stop(&self, handle: ProcessHandle) -> Result<(), RuntimeError> {
        let port = self
            .running
            .lock()
            .unwrap()
            .remove(&handle)
            .ok_or(RuntimeError::UnknownProcess(handle))?;
        self.engines.lock().unwrap().remove(&port);
        self.stopped.lock().unwrap().push(handle);
        Ok(())
    }

    async fn bound_ports(&self, _range: PortRange) -> Result<Vec<u16>, RuntimeError> {
        Ok(self.bound.clone())
    }
}

#[derive(Default)]
struct LocalGateway {
    engines: Engines,
    /// Calls left to fail before calls go through again.
    fail_next: AtomicU32,
    /// Fail every call while set.
    down: AtomicBool,
    /// Calls left whose reply is dropped after the room handled them.
    lose_replies: AtomicU32,
    /// Calls to this port never complete. 0 stalls nothing.
    stall_port: AtomicU32,
    stalled: AtomicU32,
    calls: AtomicU32,
}

impl LocalGateway {
    fn refused(port: u16) -> GatewayError {
        GatewayError::Closed {
            addr: format!("127.0.0.1:{port}"),
        }
    }
}

impl RoomGateway for LocalGateway {
    async fn call(&self, port: u16, call: RoomCall) -> Result<RoomReply, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(Self::refused(port));
        }
        let skipped = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if skipped.is_ok() {
            return Err(Self::refused(port));
        }
        if self.stall_port.load(Ordering::SeqCst) == u32::from(port) {
            self.stalled.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }

        let engine = self.engines.lock().unwrap().get(&port).cloned();
        let Some(engine) = engine else {
            return Err(Self::refused(port));
        };
        let reply = engine.handle(call).await;
        let lost = self
            .lose_replies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if lost.is_ok() {
            return Err(GatewayError::Timeout {
                addr: format!("127.0.0.1:{port}"),
                after: Duration::from_secs(5),
            });
        }
        Ok(reply)
    }
}

type TestRegistry = RoomRegistry<FakeRuntime, LocalGateway>;

fn config(ports: PortRange) -> RegistryConfig {
    RegistryConfig {
        ports,
        handshake: RetryPolicy::immediate(3),
        query: RetryPolicy::immediate(5),
        join: RetryPolicy::immediate(3),
        ..RegistryConfig::default()
    }
}

fn registry_with(ports: PortRange) -> TestRegistry {
    let engines = Engines::default();
    let runtime = FakeRuntime {
        engines: Arc::clone(&engines),
        ..FakeRuntime::default()
    };
    let gateway = LocalGateway {
        engines,
        ..LocalGateway::default()
    };
    RoomRegistry::new(config(ports), runtime, gateway)
}

fn registry() -> TestRegistry {
    registry_with(PortRange::default())
}

fn gateway(registry: &TestRegistry) -> &LocalGateway {
    registry.launcher().gateway()
}

fn runtime(registry: &TestRegistry) -> &FakeRuntime {
    registry.launcher().runtime()
}

async fn engine_of(registry: &TestRegistry, key: &RoomKey) -> Arc<GameEngine> {
    let port = registry.port_of(key).await.expect("room is registered");
    runtime(registry).engines.lock().unwrap()[&port].clone()
}

// =========================================================================
// Create / join / query
// =========================================================================

#[tokio::test]
async fn test_full_room_scenario_starts_game() {
    let registry = registry();

    let p1 = registry.create_room("alice").await.unwrap();
    assert_eq!(p1.player_id, PlayerId::numbered(1));
    assert_eq!(p1.admission, Admission::Waiting { waiting_for: 2 });
    assert_eq!(p1.room_key.as_str().len(), 6);

    let key = p1.room_key.to_string();
    let p2 = registry.join_room(&key, "bob").await.unwrap();
    assert_eq!(p2.admission, Admission::Waiting { waiting_for: 1 });

    let p3 = registry.join_room(&key, "carol").await.unwrap();
    assert!(p3.admission.started_game());
    assert!(p3.admission.to_string().contains("Game starting"));

    let view = registry
        .query_state(&key, &p1.player_id)
        .await
        .unwrap()
        .expect("player1 is seated");
    assert_eq!(view.phase, Phase::Active);
    assert_ne!(view.role_label(), "Not assigned");
    assert_eq!(view.alive.len(), 3);
    assert_eq!(registry.players(&p1.room_key).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_join_room_normalises_key() {
    let registry = registry();
    let seat = registry.create_room("alice").await.unwrap();

    let typed = format!("  {}  ", seat.room_key.as_str().to_lowercase());
    let joined = registry.join_room(&typed, "bob").await.unwrap();
    assert_eq!(joined.room_key, seat.room_key);
}

#[tokio::test]
async fn test_join_room_duplicate_name_is_name_taken() {
    let registry = registry();
    let seat = registry.create_room("alice").await.unwrap();

    let err = registry
        .join_room(seat.room_key.as_str(), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NameTaken { .. }));
    assert!(err.to_string().contains("already taken"));
    assert!(!err.is_retryable());
    assert_eq!(registry.players(&seat.room_key).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_join_room_unknown_key_is_not_found() {
    let registry = registry();
    let err = registry.join_room("ZZ99ZZ", "bob").await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
}

#[tokio::test]
async fn test_bad_input_is_validation_error() {
    let registry = registry();
    assert!(matches!(
        registry.create_room("no spaces allowed").await,
        Err(RegistryError::Validation(_))
    ));
    assert!(matches!(
        registry.create_room("").await,
        Err(RegistryError::Validation(_))
    ));
    assert!(matches!(
        registry.join_room("AB-12", "bob").await,
        Err(RegistryError::Validation(_))
    ));
    assert_eq!(registry.room_count().await, 0);
}

#[tokio::test]
async fn test_join_full_room_is_rejected_without_caching() {
    let registry = registry();
    let seat = registry.create_room("alice").await.unwrap();
    let key = seat.room_key.as_str();
    registry.join_room(key, "bob").await.unwrap();
    registry.join_room(key, "carol").await.unwrap();

    let err = registry.join_room(key, "dave").await.unwrap_err();
    match err {
        RegistryError::Rejected { admission, .. } => {
            assert_eq!(admission, Admission::RoomFull);
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
    assert_eq!(registry.players(&seat.room_key).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_query_state_unknown_room_or_player_is_none() {
    let registry = registry();
    let seat = registry.create_room("alice").await.unwrap();

    let unknown_room = registry
        .query_state("ZZ99ZZ", &PlayerId::numbered(1))
        .await
        .unwrap();
    assert!(unknown_room.is_none());

    let unknown_player = registry
        .query_state(seat.room_key.as_str(), &PlayerId::numbered(77))
        .await
        .unwrap();
    assert!(unknown_player.is_none());
}

#[tokio::test]
async fn test_query_state_twice_returns_identical_views() {
    let registry = registry();
    let seat = registry.create_room("alice").await.unwrap();
    let key = seat.room_key.as_str();
    registry.join_room(key, "bob").await.unwrap();
    registry.join_room(key, "carol").await.unwrap();

    let first = registry.query_state(key, &seat.player_id).await.unwrap();
    let second = registry.query_state(key, &seat.player_id).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_query_state_retries_transient_failures() {
    let registry = registry();
    let seat = registry.create_room("alice").await.unwrap();

    gateway(&registry).fail_next.store(4, Ordering::SeqCst);
    let view = registry
        .query_state(seat.room_key.as_str(), &seat.player_id)
        .await
        .unwrap();
    assert!(view.is_some());
}

#[tokio::test]
async fn test_query_state_unreachable_after_attempts() {
    let registry = registry();
    let seat = registry.create_room("alice").await.unwrap();

    let gw = gateway(&registry);
    gw.down.store(true, Ordering::SeqCst);
    let before = gw.calls.load(Ordering::SeqCst);

    let err = registry
        .query_state(seat.room_key.as_str(), &seat.player_id)
        .await
        .unwrap_err();
    match &err {
        RegistryError::Unreachable { source, .. } => assert_eq!(source.attempts, 5),
        other => panic!("expected unreachable, got {other:?}"),
    }
    assert!(err.is_retryable());
    assert_eq!(gw.calls.load(Ordering::SeqCst) - before, 5);
}

#[tokio::test]
async fn test_join_room_unreachable_leaves_roster_alone() {
    let registry = registry();
    let seat = registry.create_room("alice").await.unwrap();
    gateway(&registry).down.store(true, Ordering::SeqCst);

    let err = registry
        .join_room(seat.room_key.as_str(), "bob")
        .await
        .unwrap_err();
    match &err {
        RegistryError::Unreachable { source, .. } => assert_eq!(source.attempts, 3),
        other => panic!("expected unreachable, got {other:?}"),
    }
    assert!(err.is_retryable());
    assert_eq!(registry.players(&seat.room_key).await.unwrap().len(), 1);

    // The room might have seated player2, so that id isn't reissued.
    gateway(&registry).down.store(false, Ordering::SeqCst);
    let bob = registry
        .join_room(seat.room_key.as_str(), "bob")
        .await
        .unwrap();
    assert_eq!(bob.player_id, PlayerId::numbered(3));
}

#[tokio::test]
async fn test_join_room_lost_reply_is_retried_with_same_id() {
    let registry = registry();
    let seat = registry.create_room("alice").await.unwrap();
    let key = seat.room_key.as_str();

    gateway(&registry).lose_replies.store(1, Ordering::SeqCst);
    let bob = registry.join_room(key, "bob").await.unwrap();
    assert_eq!(bob.player_id, PlayerId::numbered(2));
    assert_eq!(bob.admission, Admission::Waiting { waiting_for: 1 });

    let carol = registry.join_room(key, "carol").await.unwrap();
    assert_eq!(carol.player_id, PlayerId::numbered(3));
    assert!(carol.admission.started_game());
    assert_eq!(registry.players(&seat.room_key).await.unwrap().len(), 3);

    let other = registry.create_room("dave").await.unwrap();
    assert_eq!(other.player_id, PlayerId::numbered(4));
}

#[tokio::test]
async fn test_join_room_every_reply_lost_never_reuses_id() {
    let registry = registry();
    let seat = registry.create_room("alice").await.unwrap();
    let key = seat.room_key.as_str();

    // The room seats bob, but no reply ever makes it back.
    gateway(&registry).lose_replies.store(3, Ordering::SeqCst);
    let err = registry.join_room(key, "bob").await.unwrap_err();
    assert!(matches!(err, RegistryError::Unreachable { .. }));

    let carol = registry.join_room(key, "carol").await.unwrap();
    assert_eq!(carol.player_id, PlayerId::numbered(3));

    let other = registry.create_room("erin").await.unwrap();
    assert_ne!(other.player_id, PlayerId::numbered(2));
    assert_ne!(other.player_id, carol.player_id);

    let engine = engine_of(&registry, &seat.room_key).await;
    let seated = engine.snapshot().await.player_ids();
    assert_eq!(
        seated,
        vec![PlayerId::numbered(1), PlayerId::numbered(2), PlayerId::numbered(3)]
    );
}

#[tokio::test]
async fn test_join_room_id_in_use_tries_fresh_id() {
    let registry = registry();
    let seat = registry.create_room("alice").await.unwrap();

    // The room already knows player2 from outside the registry.
    let engine = engine_of(&registry, &seat.room_key).await;
    engine
        .join_room(
            &seat.room_key,
            PlayerId::numbered(2),
            PlayerName::parse("mallory").unwrap(),
        )
        .await;

    let bob = registry
        .join_room(seat.room_key.as_str(), "bob")
        .await
        .unwrap();
    assert_eq!(bob.player_id, PlayerId::numbered(3));
    assert!(bob.admission.started_game());

    let other = registry.create_room("carol").await.unwrap();
    assert_eq!(other.player_id, PlayerId::numbered(4));
}

// =========================================================================
// Launch failures and ports
// =========================================================================

#[tokio::test]
async fn test_handshake_succeeds_after_retries() {
    let registry = registry();
    gateway(&registry).fail_next.store(2, Ordering::SeqCst);

    let seat = registry.create_room("alice").await.unwrap();
    assert!(seat.admission.is_admitted());
    assert_eq!(gateway(&registry).calls.load(Ordering::SeqCst), 3);
    assert_eq!(registry.room_count().await, 1);
}

#[tokio::test]
async fn test_handshake_exhausted_releases_everything() {
    let registry = registry_with(PortRange::new(8001, 8003));
    gateway(&registry).fail_next.store(3, Ordering::SeqCst);

    let err = registry.create_room("alice").await.unwrap_err();
    match &err {
        RegistryError::CreateFailed(LaunchError::Handshake { port, source, .. }) => {
            assert_eq!(*port, 8001);
            assert_eq!(source.attempts, 3);
        }
        other => panic!("expected a handshake failure, got {other:?}"),
    }
    assert!(err.is_retryable());
    assert_eq!(registry.room_count().await, 0);
    assert_eq!(registry.free_ports().await, 3);
    assert_eq!(runtime(&registry).running(), 0);
    assert_eq!(runtime(&registry).stopped(), 1);

    // The same port and id are handed out again.
    let seat = registry.create_room("alice").await.unwrap();
    assert_eq!(registry.port_of(&seat.room_key).await, Some(8001));
    assert_eq!(seat.player_id, PlayerId::numbered(1));
}

#[tokio::test]
async fn test_start_failure_releases_port() {
    let registry = registry_with(PortRange::new(8001, 8001));
    runtime(&registry).fail_start.store(true, Ordering::SeqCst);

    let err = registry.create_room("alice").await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::CreateFailed(LaunchError::Start { port: 8001, .. })
    ));
    assert_eq!(registry.free_ports().await, 1);
    assert_eq!(registry.room_count().await, 0);
}

#[tokio::test]
async fn test_create_room_when_ports_exhausted() {
    let registry = registry_with(PortRange::new(8001, 8001));
    registry.create_room("alice").await.unwrap();

    let err = registry.create_room("bob").await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::CreateFailed(LaunchError::Ports(PortError::Exhausted { .. }))
    ));
    assert!(err.is_retryable());
    assert_eq!(registry.room_count().await, 1);
}

#[tokio::test]
async fn test_close_room_frees_port_for_reuse() {
    let registry = registry_with(PortRange::new(8001, 8001));
    let seat = registry.create_room("alice").await.unwrap();

    let closed = registry.close_room(seat.room_key.as_str()).await.unwrap();
    assert_eq!(closed, seat.room_key);
    assert_eq!(registry.room_count().await, 0);
    assert_eq!(runtime(&registry).stopped(), 1);

    let next = registry.create_room("bob").await.unwrap();
    assert_eq!(registry.port_of(&next.room_key).await, Some(8001));

    let err = registry.close_room(seat.room_key.as_str()).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
}

#[tokio::test]
async fn test_start_skips_ports_bound_by_earlier_rooms() {
    let engines = Engines::default();
    let runtime = FakeRuntime {
        engines: Arc::clone(&engines),
        bound: vec![8001, 8002],
        ..FakeRuntime::default()
    };
    let gateway = LocalGateway {
        engines,
        ..LocalGateway::default()
    };
    let registry = RoomRegistry::start(config(PortRange::new(8001, 8003)), runtime, gateway)
        .await
        .unwrap();

    assert_eq!(registry.free_ports().await, 1);
    let seat = registry.create_room("alice").await.unwrap();
    assert_eq!(registry.port_of(&seat.room_key).await, Some(8003));
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_and_joins_never_share_ids() {
    let registry = Arc::new(registry());

    let creates: Vec<_> = (0..4)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.create_room(&format!("host_{i}")).await })
        })
        .collect();
    let mut keys: Vec<RoomKey> = Vec::new();
    let mut ids: Vec<PlayerId> = Vec::new();
    for task in creates {
        let seat = task.await.unwrap().unwrap();
        keys.push(seat.room_key);
        ids.push(seat.player_id);
    }

    let joins: Vec<_> = keys
        .iter()
        .flat_map(|key| (0..2).map(move |j| (key.clone(), j)))
        .map(|(key, j)| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.join_room(key.as_str(), &format!("guest_{j}")).await })
        })
        .collect();
    for task in joins {
        ids.push(task.await.unwrap().unwrap().player_id);
    }

    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(ids.len(), 12);
    assert_eq!(unique.len(), 12, "duplicate ids in {ids:?}");

    let unique_keys: HashSet<_> = keys.iter().collect();
    assert_eq!(unique_keys.len(), 4);
    for key in &keys {
        assert_eq!(registry.players(key).await.unwrap().len(), 3);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_never_share_ports() {
    let registry = Arc::new(registry_with(PortRange::new(8001, 8005)));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.create_room(&format!("host_{i}")).await })
        })
        .collect();

    let mut ports = HashSet::new();
    let mut exhausted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(seat) => {
                let port = registry.port_of(&seat.room_key).await.unwrap();
                assert!(ports.insert(port), "port {port} handed out twice");
            }
            Err(RegistryError::CreateFailed(LaunchError::Ports(_))) => exhausted += 1,
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(ports.len(), 5);
    assert_eq!(exhausted, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_room_does_not_block_other_rooms() {
    let registry = Arc::new(registry());
    let slow = registry.create_room("alice").await.unwrap();
    let fast = registry.create_room("bob").await.unwrap();

    let slow_port = registry.port_of(&slow.room_key).await.unwrap();
    let gw = gateway(&registry);
    gw.stall_port.store(u32::from(slow_port), Ordering::SeqCst);

    let stuck = {
        let registry = Arc::clone(&registry);
        let key = slow.room_key.to_string();
        tokio::spawn(async move { registry.join_room(&key, "carol").await })
    };
    tokio::time::timeout(Duration::from_secs(2), async {
        while gw.stalled.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("join should reach the stalled room");

    let within = Duration::from_secs(2);
    let created = tokio::time::timeout(within, registry.create_room("dave"))
        .await
        .expect("create must not wait on the stalled room");
    assert!(created.is_ok());

    let joined = tokio::time::timeout(within, registry.join_room(fast.room_key.as_str(), "erin"))
        .await
        .expect("join elsewhere must not wait on the stalled room");
    assert!(joined.is_ok());

    let view = tokio::time::timeout(within, registry.query_state(fast.room_key.as_str(), &fast.player_id))
        .await
        .expect("query elsewhere must not wait on the stalled room");
    assert!(view.unwrap().is_some());

    assert!(!stuck.is_finished());
    stuck.abort();
}
