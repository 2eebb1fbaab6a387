//! Core types shared by the master tier and the room processes.
//!
//! Everything here either travels on the wire between the registry and
//! a room's game engine, or is part of the data model both sides agree
//! on (room keys, player identities, roles, phases).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Number of characters in a room key.
pub const ROOM_KEY_LEN: usize = 6;

/// Maximum number of characters in a display name.
pub const MAX_NAME_LEN: usize = 20;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The 6-character key players share to meet in the same room.
///
/// Always uppercase letters and digits. [`RoomKey::parse`] trims and
/// upper-cases what a player typed, so `" ab12cd"` and `"AB12CD"` name
/// the same room. Deserialization goes through the same check, so a
/// malformed key never makes it past the codec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomKey(String);

impl RoomKey {
    /// Normalizes and validates a room key.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let key = raw.trim().to_ascii_uppercase();
        let well_formed = key.len() == ROOM_KEY_LEN
            && key
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
        if well_formed {
            Ok(Self(key))
        } else {
            Err(ProtocolError::InvalidRoomKey(raw.to_string()))
        }
    }

    /// Wraps a key the identifier generator just produced.
    pub(crate) fn from_generated(key: String) -> Self {
        Self(key)
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomKey {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomKey> for String {
    fn from(key: RoomKey) -> Self {
        key.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A player identifier of the form `playerN`.
///
/// Identifiers are unique across every active room of a deployment, not
/// just within one room. See [`new_player_id`](crate::new_player_id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Prefix shared by every generated identifier.
    pub const PREFIX: &'static str = "player";

    /// Builds the identifier `player{n}`.
    pub fn numbered(n: u32) -> Self {
        Self(format!("{}{n}", Self::PREFIX))
    }

    /// Returns `n` for an identifier of the form `player{n}`.
    pub fn number(&self) -> Option<u32> {
        self.0.strip_prefix(Self::PREFIX)?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A display name: 1–20 characters from `a-z A-Z 0-9 _`.
///
/// Unique within a room, not across rooms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerName(String);

impl PlayerName {
    /// Trims surrounding whitespace and validates the result.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let name = raw.trim();
        let len = name.chars().count();
        let well_formed = (1..=MAX_NAME_LEN).contains(&len)
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if well_formed {
            Ok(Self(name.to_string()))
        } else {
            Err(ProtocolError::InvalidName(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PlayerName {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PlayerName> for String {
    fn from(name: PlayerName) -> Self {
        name.0
    }
}

impl fmt::Display for PlayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Game model
// ---------------------------------------------------------------------------

/// A secret role handed to each player once the room is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Hacker,
    Firewall,
    Auditor,
}

impl Role {
    /// The reference role set: one of each.
    pub const ALL: [Role; 3] = [Role::Hacker, Role::Firewall, Role::Auditor];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hacker => write!(f, "Hacker"),
            Self::Firewall => write!(f, "Firewall"),
            Self::Auditor => write!(f, "Auditor"),
        }
    }
}

/// Coarse game stage.
///
/// ```text
/// Setup ──(roster reaches capacity)──→ Active
/// ```
///
/// Monotonic: a room never goes back to `Setup`. `Active` is terminal
/// for now; night/day cycling is not modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Accepting players.
    #[default]
    Setup,
    /// Roster complete, roles assigned.
    Active,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => write!(f, "setup"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// The outcome of asking a room's engine to admit a player.
///
/// Replaces the free-form status strings callers used to pattern-match.
/// `Display` still renders the human-readable message, and those
/// messages keep the familiar phrases ("Room is full", "already in
/// use", "Game starting", "Cannot join") for anything that shows them
/// to players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Admission {
    /// Admitted; the room still needs `waiting_for` more players.
    Waiting { waiting_for: usize },
    /// Admitted as the final player; roles were just assigned.
    GameStarted { instructions: String },
    /// The roster is at capacity.
    RoomFull,
    /// The player id is already on the roster.
    IdInUse,
    /// The display name is already taken in this room.
    NameInUse,
    /// The room has left the setup phase.
    AlreadyStarted,
    /// The call named a different room than the one this engine serves.
    WrongRoom,
}

impl Admission {
    /// Returns `true` if the player is now on the roster.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Waiting { .. } | Self::GameStarted { .. })
    }

    /// Returns `true` if this admission moved the room to [`Phase::Active`].
    pub fn started_game(&self) -> bool {
        matches!(self, Self::GameStarted { .. })
    }
}

impl fmt::Display for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting { waiting_for: 1 } => {
                write!(f, "Joined. Waiting for 1 more player.")
            }
            Self::Waiting { waiting_for } => {
                write!(f, "Joined. Waiting for {waiting_for} more players.")
            }
            Self::GameStarted { instructions } => {
                write!(f, "Game starting! {instructions}")
            }
            Self::RoomFull => write!(f, "Cannot join: Room is full."),
            Self::IdInUse => write!(f, "Cannot join: player ID already in use."),
            Self::NameInUse => write!(f, "Cannot join: name already in use in this room."),
            Self::AlreadyStarted => write!(f, "Cannot join: game already started."),
            Self::WrongRoom => write!(f, "Cannot join: unknown room."),
        }
    }
}

/// What one player is allowed to see of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStateView {
    pub room_key: RoomKey,
    pub phase: Phase,
    pub player_id: PlayerId,
    pub player_name: PlayerName,
    /// `None` until the room leaves setup.
    pub role: Option<Role>,
    /// Alive players, in join order.
    pub alive: Vec<PlayerId>,
    pub player_count: usize,
    /// Alive hackers (including the viewer). Only present when the
    /// viewer is a hacker themself.
    pub hacker_team: Option<Vec<PlayerId>>,
    /// Only present once the room is active.
    pub instructions: Option<String>,
}

impl GameStateView {
    /// The role as shown to the player.
    pub fn role_label(&self) -> String {
        match self.role {
            Some(role) => role.to_string(),
            None => "Not assigned".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire envelopes
// ---------------------------------------------------------------------------

/// One remote call. `seq` is echoed back in the matching [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request<C> {
    pub seq: u64,
    pub call: C,
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response<R> {
    pub seq: u64,
    pub reply: R,
}

/// Calls the registry makes against a room process.
///
/// Internally tagged by `method`:
/// `{ "method": "join_room", "room_key": "AB12CD", ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RoomCall {
    /// Handshake + admission of the room's creator. Idempotent for the
    /// same id and name, so the launcher can retry it.
    CreateRoom {
        player_id: PlayerId,
        player_name: PlayerName,
    },
    JoinRoom {
        room_key: RoomKey,
        player_id: PlayerId,
        player_name: PlayerName,
    },
    /// `room_key` may be omitted: a process only serves one room.
    GetGameState {
        #[serde(default)]
        room_key: Option<RoomKey>,
        player_id: PlayerId,
    },
}

/// What a room process answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RoomReply {
    Admission(Admission),
    /// `None` for an unknown room or player.
    GameState(Option<GameStateView>),
    /// The request could not be processed (malformed, etc.).
    Error { message: String },
}

/// Calls a front-end makes against the master registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum MasterCall {
    CreateRoom { player_name: String },
    JoinRoom { room_key: String, player_name: String },
    QueryState { room_key: String, player_id: PlayerId },
    CloseRoom { room_key: String },
}

/// Error categories a front-end can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    CreateFailed,
    NotFound,
    NameTaken,
    Rejected,
    Unreachable,
    BadRequest,
    Internal,
}

/// What the master answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MasterReply {
    /// The caller now has a seat in `room_key` as `player_id`. The front
    /// end keeps this triple for the rest of the session.
    Seat {
        room_key: RoomKey,
        player_id: PlayerId,
        player_name: PlayerName,
        admission: Admission,
    },
    GameState(Option<GameStateView>),
    Closed { room_key: RoomKey },
    Error {
        kind: ErrorKind,
        message: String,
        retryable: bool,
    },
}
