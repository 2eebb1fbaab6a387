//! The per-room game state machine.
//!
//! [`GameState`] is plain data with `&mut self` transitions. It is not
//! thread-safe by itself; [`GameEngine`](crate::GameEngine) puts it
//! behind a single lock so that admission, role dealing and the phase
//! change happen as one step.

use std::collections::{HashMap, HashSet};

use hackroom_protocol::{
    Admission, GameStateView, Phase, PlayerId, PlayerName, Role, RoomKey,
};
use rand::seq::SliceRandom;

use crate::{EngineConfig, EngineError};

/// One roster entry, kept in join order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Seat {
    id: PlayerId,
    name: PlayerName,
}

/// Authoritative state of one room.
#[derive(Debug, Clone)]
pub struct GameState {
    room_key: RoomKey,
    config: EngineConfig,
    phase: Phase,
    roster: Vec<Seat>,
    roles: HashMap<PlayerId, Role>,
    alive: HashSet<PlayerId>,
}

impl GameState {
    /// Creates an empty room in [`Phase::Setup`].
    ///
    /// # Errors
    /// Returns the [`EngineConfig::validate`] error if the config can't
    /// run a room (e.g. role count differs from capacity).
    pub fn new(room_key: RoomKey, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            room_key,
            config,
            phase: Phase::Setup,
            roster: Vec::new(),
            roles: HashMap::new(),
            alive: HashSet::new(),
        })
    }

    pub fn room_key(&self) -> &RoomKey {
        &self.room_key
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn player_count(&self) -> usize {
        self.roster.len()
    }

    /// Player ids in join order.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.roster.iter().map(|s| s.id.clone()).collect()
    }

    pub fn role_of(&self, player_id: &PlayerId) -> Option<Role> {
        self.roles.get(player_id).copied()
    }

    /// Every role dealt so far (empty until the room is full).
    pub fn assigned_roles(&self) -> Vec<Role> {
        self.roster
            .iter()
            .filter_map(|s| self.roles.get(&s.id).copied())
            .collect()
    }

    /// Admits the room's creator.
    ///
    /// Repeating the call for a player who is already seated under the
    /// same name returns the current admission instead of
    /// [`Admission::IdInUse`]. The launcher retries this call as its
    /// readiness handshake, and a reply lost on the way back must not
    /// turn into a failure on the next attempt.
    pub fn create(&mut self, player_id: PlayerId, player_name: PlayerName) -> Admission {
        if self.is_seated(&player_id, &player_name) {
            return self.current_admission();
        }
        self.admit(player_id, player_name)
    }

    fn is_seated(&self, player_id: &PlayerId, player_name: &PlayerName) -> bool {
        self.roster
            .iter()
            .any(|s| s.id == *player_id && s.name == *player_name)
    }

    /// Admits a player who named this room by key.
    ///
    /// Repeats are answered like [`create`](Self::create): the registry
    /// retries a join whose reply went missing with the same id and name.
    pub fn join(
        &mut self,
        room_key: &RoomKey,
        player_id: PlayerId,
        player_name: PlayerName,
    ) -> Admission {
        if *room_key != self.room_key {
            tracing::debug!(
                room_key = %self.room_key,
                requested = %room_key,
                "join for another room, rejecting"
            );
            return Admission::WrongRoom;
        }
        if self.is_seated(&player_id, &player_name) {
            return self.current_admission();
        }
        self.admit(player_id, player_name)
    }

    fn admit(&mut self, player_id: PlayerId, player_name: PlayerName) -> Admission {
        // A full roster is reported as such even though the phase has
        // also moved on, so late joiners see "room full".
        if self.roster.len() >= self.config.capacity {
            return Admission::RoomFull;
        }
        if self.phase != Phase::Setup {
            return Admission::AlreadyStarted;
        }
        if self.roster.iter().any(|s| s.id == player_id) {
            return Admission::IdInUse;
        }
        if self.roster.iter().any(|s| s.name == player_name) {
            return Admission::NameInUse;
        }

        self.alive.insert(player_id.clone());
        self.roster.push(Seat {
            id: player_id.clone(),
            name: player_name,
        });
        tracing::info!(
            room_key = %self.room_key,
            %player_id,
            players = self.roster.len(),
            capacity = self.config.capacity,
            "player joined"
        );

        if self.roster.len() == self.config.capacity {
            self.start_game();
        }
        self.current_admission()
    }

    /// Deals roles and moves the room to [`Phase::Active`].
    ///
    /// The configured roles are shuffled and zipped against the roster
    /// in join order, so the dealt multiset is always exactly the
    /// configured one.
    fn start_game(&mut self) {
        let mut deck = self.config.roles.clone();
        deck.shuffle(&mut rand::rng());
        for (seat, role) in self.roster.iter().zip(deck) {
            self.roles.insert(seat.id.clone(), role);
        }
        self.phase = Phase::Active;
        tracing::info!(
            room_key = %self.room_key,
            players = self.roster.len(),
            "roles assigned, game started"
        );
    }

    fn current_admission(&self) -> Admission {
        match self.phase {
            Phase::Setup => Admission::Waiting {
                waiting_for: self.config.capacity - self.roster.len(),
            },
            Phase::Active => Admission::GameStarted {
                instructions: self.config.instructions.clone(),
            },
        }
    }

    /// What `player_id` may see of the room.
    ///
    /// Returns `None` if `room_key` names another room or the player is
    /// not on the roster. Only hackers get `hacker_team`.
    pub fn view(
        &self,
        room_key: Option<&RoomKey>,
        player_id: &PlayerId,
    ) -> Option<GameStateView> {
        if room_key.is_some_and(|key| *key != self.room_key) {
            return None;
        }
        let seat = self.roster.iter().find(|s| s.id == *player_id)?;
        let role = self.role_of(player_id);

        let alive: Vec<PlayerId> = self
            .roster
            .iter()
            .filter(|s| self.alive.contains(&s.id))
            .map(|s| s.id.clone())
            .collect();

        let hacker_team = (role == Some(Role::Hacker)).then(|| {
            alive
                .iter()
                .filter(|id| self.role_of(id) == Some(Role::Hacker))
                .cloned()
                .collect()
        });

        Some(GameStateView {
            room_key: self.room_key.clone(),
            phase: self.phase,
            player_id: seat.id.clone(),
            player_name: seat.name.clone(),
            role,
            alive,
            player_count: self.roster.len(),
            hacker_team,
            instructions: (self.phase == Phase::Active)
                .then(|| self.config.instructions.clone()),
        })
    }
}
