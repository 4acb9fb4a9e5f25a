use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque room identifier.
pub type RoomId = Uuid;

/// Opaque, already-resolved user identifier.
pub type UserId = String;

/// Default member capacity for a new room.
pub const DEFAULT_ROOM_CAPACITY: u32 = 32;

/// Characters used for join codes. Ambiguous glyphs (0/O, 1/I) are left out.
const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of characters in a join code.
pub const JOIN_CODE_LEN: usize = 6;

/// A persistent community container that hosts a sequence of arenas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub owner_id: UserId,
    #[serde(default)]
    pub join_code: Option<String>,
    pub capacity: u32,
}

/// A user's standing inside a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomRole {
    Owner,
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMembership {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: RoomRole,
}

/// Generate a random join code such as `K7QPX2`.
pub fn generate_join_code() -> String {
    let mut rng = rand::rng();
    (0..JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_ALPHABET[rng.random_range(0..JOIN_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Check that a code has the join-code shape. Lowercase input is accepted.
pub fn is_valid_join_code(code: &str) -> bool {
    code.len() == JOIN_CODE_LEN
        && code
            .bytes()
            .all(|b| JOIN_CODE_ALPHABET.contains(&b.to_ascii_uppercase()))
}
