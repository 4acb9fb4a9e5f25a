use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use uuid::Uuid;

use prowl_core::error::{ArenaError, ArenaResult};
use prowl_core::room::{
    DEFAULT_ROOM_CAPACITY, Room, RoomId, RoomMembership, RoomRole, UserId, generate_join_code,
    is_valid_join_code,
};

/// Longest accepted room name, in bytes.
const MAX_ROOM_NAME_LEN: usize = 64;

/// Room and membership lookups the arena engine depends on. Rooms live
/// outside the engine; only these two questions are ever asked.
pub trait RoomDirectory: Send + Sync {
    fn room_exists(&self, room_id: &RoomId) -> bool;
    fn is_member(&self, room_id: &RoomId, user_id: &str) -> bool;
}

#[derive(Default)]
struct RoomTables {
    rooms: HashMap<RoomId, Room>,
    members: HashMap<RoomId, HashMap<UserId, RoomRole>>,
    /// Uppercased join code -> room id
    codes: HashMap<String, RoomId>,
}

/// In-memory room and membership store used by the server binary and tests.
#[derive(Default)]
pub struct InMemoryRoomStore {
    tables: RwLock<RoomTables>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room owned by `owner_id`, who becomes its first member.
    pub fn create_room(
        &self,
        name: &str,
        owner_id: &str,
        capacity: Option<u32>,
    ) -> ArenaResult<Room> {
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_ROOM_NAME_LEN {
            return Err(ArenaError::InvalidInput(format!(
                "room name must be 1-{MAX_ROOM_NAME_LEN} characters"
            )));
        }
        let capacity = capacity.unwrap_or(DEFAULT_ROOM_CAPACITY);
        if capacity == 0 {
            return Err(ArenaError::InvalidInput("capacity must be > 0".to_string()));
        }

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let code = loop {
            let code = generate_join_code();
            if !tables.codes.contains_key(&code) {
                break code;
            }
        };
        let room = Room {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            join_code: Some(code.clone()),
            capacity,
        };
        tables.codes.insert(code, room.id);
        tables
            .members
            .entry(room.id)
            .or_default()
            .insert(owner_id.to_string(), RoomRole::Owner);
        tables.rooms.insert(room.id, room.clone());
        tracing::info!(room = %room.id, owner = owner_id, "Room created");
        Ok(room)
    }

    pub fn get_room(&self, room_id: &RoomId) -> Option<Room> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.rooms.get(room_id).cloned()
    }

    pub fn find_by_code(&self, code: &str) -> Option<Room> {
        if !is_valid_join_code(code) {
            return None;
        }
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let id = tables.codes.get(&code.to_ascii_uppercase())?;
        tables.rooms.get(id).cloned()
    }

    /// Add a member. Re-adding an existing member returns the current membership.
    pub fn add_member(&self, room_id: &RoomId, user_id: &str) -> ArenaResult<RoomMembership> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let capacity = tables
            .rooms
            .get(room_id)
            .map(|r| r.capacity)
            .ok_or(ArenaError::RoomNotFound { room_id: *room_id })?;
        let members = tables.members.entry(*room_id).or_default();
        if let Some(&role) = members.get(user_id) {
            return Ok(RoomMembership {
                room_id: *room_id,
                user_id: user_id.to_string(),
                role,
            });
        }
        if members.len() >= capacity as usize {
            return Err(ArenaError::InvalidInput("room is full".to_string()));
        }
        members.insert(user_id.to_string(), RoomRole::Member);
        Ok(RoomMembership {
            room_id: *room_id,
            user_id: user_id.to_string(),
            role: RoomRole::Member,
        })
    }

    pub fn join_by_code(&self, code: &str, user_id: &str) -> ArenaResult<(Room, RoomMembership)> {
        let room = self
            .find_by_code(code)
            .ok_or_else(|| ArenaError::InvalidInput(format!("unknown join code: {code}")))?;
        let membership = self.add_member(&room.id, user_id)?;
        Ok((room, membership))
    }

    /// Drop a member from a room. The owner cannot leave their own room.
    pub fn leave_room(&self, room_id: &RoomId, user_id: &str) -> ArenaResult<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if !tables.rooms.contains_key(room_id) {
            return Err(ArenaError::RoomNotFound { room_id: *room_id });
        }
        let members = tables.members.entry(*room_id).or_default();
        match members.get(user_id) {
            None => Err(ArenaError::NotMember {
                room_id: *room_id,
                user_id: user_id.to_string(),
            }),
            Some(RoomRole::Owner) => Err(ArenaError::InvalidInput(
                "the owner cannot leave; delete the room instead".to_string(),
            )),
            Some(RoomRole::Member) => {
                members.remove(user_id);
                Ok(())
            },
        }
    }

    /// Delete a room with its memberships and join code. Owner only.
    pub fn delete_room(&self, room_id: &RoomId, caller: &str) -> ArenaResult<Room> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let room = tables
            .rooms
            .get(room_id)
            .ok_or(ArenaError::RoomNotFound { room_id: *room_id })?;
        if room.owner_id != caller {
            return Err(ArenaError::NotOwner {
                room_id: *room_id,
                user_id: caller.to_string(),
            });
        }
        let Some(room) = tables.rooms.remove(room_id) else {
            return Err(ArenaError::RoomNotFound { room_id: *room_id });
        };
        if let Some(code) = &room.join_code {
            tables.codes.remove(code);
        }
        tables.members.remove(room_id);
        tracing::info!(room = %room.id, "Room deleted");
        Ok(room)
    }

    /// Ownership check without mutating, so callers can validate before
    /// cleaning up dependent state.
    pub fn require_owner(&self, room_id: &RoomId, caller: &str) -> ArenaResult<()> {
        let room = self
            .get_room(room_id)
            .ok_or(ArenaError::RoomNotFound { room_id: *room_id })?;
        if room.owner_id != caller {
            return Err(ArenaError::NotOwner {
                room_id: *room_id,
                user_id: caller.to_string(),
            });
        }
        Ok(())
    }

    pub fn members(&self, room_id: &RoomId) -> Vec<RoomMembership> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<RoomMembership> = tables
            .members
            .get(room_id)
            .map(|m| {
                m.iter()
                    .map(|(user_id, &role)| RoomMembership {
                        room_id: *room_id,
                        user_id: user_id.clone(),
                        role,
                    })
                    .collect()
            })
            .unwrap_or_default();
        list.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        list
    }
}

impl RoomDirectory for InMemoryRoomStore {
    fn room_exists(&self, room_id: &RoomId) -> bool {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.rooms.contains_key(room_id)
    }

    fn is_member(&self, room_id: &RoomId, user_id: &str) -> bool {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables
            .members
            .get(room_id)
            .is_some_and(|m| m.contains_key(user_id))
    }
}
