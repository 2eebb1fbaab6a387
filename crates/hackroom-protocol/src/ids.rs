//! Identifier generation for room keys and player ids.

use std::collections::HashSet;

use rand::Rng;

use crate::{PlayerId, RoomKey, ROOM_KEY_LEN};

const ROOM_KEY_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Returns a random 6-character key of uppercase letters and digits.
///
/// Does not check for collisions. The registry re-rolls against its own
/// table before committing a room.
pub fn new_room_key() -> RoomKey {
    let mut rng = rand::rng();
    let key = (0..ROOM_KEY_LEN)
        .map(|_| {
            let idx = rng.random_range(0..ROOM_KEY_CHARSET.len());
            ROOM_KEY_CHARSET[idx] as char
        })
        .collect();
    RoomKey::from_generated(key)
}

/// Returns `player{n}` for the smallest `n >= 1` not in `existing`.
///
/// `existing` must be every id in use across all rooms, read under the
/// same lock that registers the new player.
pub fn new_player_id(existing: &HashSet<PlayerId>) -> PlayerId {
    (1..)
        .map(PlayerId::numbered)
        .find(|id| !existing.contains(id))
        .unwrap_or_else(|| PlayerId::numbered(u32::MAX))
}
