use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use prowl_core::arena::{Arena, ArenaId, ArenaStatus, GameMode};
use prowl_core::error::{ArenaError, ArenaResult};
use prowl_core::participant::{ArenaParticipant, GeoPoint};
use prowl_core::room::{RoomId, UserId};
use prowl_core::time::Timestamp;

/// The repository guarded for concurrent access. Operations that check an
/// invariant and then write hold the write guard for the whole sequence.
pub type SharedRepository = Arc<RwLock<ArenaRepository>>;

/// Arena counts per lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ArenaCounts {
    pub lobby: usize,
    pub active: usize,
    pub ended: usize,
}

/// Authoritative in-process store of arenas and their participants.
///
/// Single-record operations are atomic with respect to the caller holding
/// the guard; nothing here spans records on its own.
#[derive(Debug, Default)]
pub struct ArenaRepository {
    arenas: HashMap<ArenaId, Arena>,
    /// arena id -> user id -> participation
    participants: HashMap<ArenaId, HashMap<UserId, ArenaParticipant>>,
}

impl ArenaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRepository {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Insert a new arena in `lobby` with a fresh id.
    pub fn insert_arena(
        &mut self,
        room_id: RoomId,
        host_user_id: &str,
        mode: GameMode,
        duration_minutes: u32,
        settings: serde_json::Map<String, serde_json::Value>,
        now: Timestamp,
    ) -> Arena {
        let arena = Arena {
            id: Uuid::new_v4(),
            room_id,
            mode,
            status: ArenaStatus::Lobby,
            host_user_id: host_user_id.to_string(),
            duration_minutes,
            created_at: now,
            updated_at: now,
            started_at: None,
            ended_at: None,
            winner_team: None,
            ended_reason: None,
            settings,
        };
        self.arenas.insert(arena.id, arena.clone());
        arena
    }

    pub fn get_arena(&self, arena_id: &ArenaId) -> Option<&Arena> {
        self.arenas.get(arena_id)
    }

    /// Look up an arena or fail with `ArenaNotFound`.
    pub fn require_arena(&self, arena_id: &ArenaId) -> ArenaResult<&Arena> {
        self.arenas.get(arena_id).ok_or(ArenaError::ArenaNotFound {
            arena_id: *arena_id,
        })
    }

    /// Apply `f` to an arena and stamp `updated_at`.
    #[cfg(test)]
    pub fn update_arena(
        &mut self,
        arena_id: &ArenaId,
        now: Timestamp,
        f: impl FnOnce(&mut Arena),
    ) -> ArenaResult<&Arena> {
        let arena = self
            .arenas
            .get_mut(arena_id)
            .ok_or(ArenaError::ArenaNotFound {
                arena_id: *arena_id,
            })?;
        f(arena);
        arena.updated_at = now;
        Ok(arena)
    }

    /// Compare-and-swap on arena status: moves to `next` only if the current
    /// status equals `expected` and the step is a legal forward transition.
    pub fn transition_status(
        &mut self,
        arena_id: &ArenaId,
        expected: ArenaStatus,
        next: ArenaStatus,
        now: Timestamp,
    ) -> ArenaResult<&mut Arena> {
        let arena = self
            .arenas
            .get_mut(arena_id)
            .ok_or(ArenaError::ArenaNotFound {
                arena_id: *arena_id,
            })?;
        if arena.status != expected || !arena.status.can_transition_to(next) {
            return Err(ArenaError::InvalidStateTransition {
                arena_id: *arena_id,
                from: arena.status,
                to: next,
            });
        }
        arena.status = next;
        arena.updated_at = now;
        Ok(arena)
    }

    /// Delete an arena and, with it, every participation record.
    pub fn delete_arena(&mut self, arena_id: &ArenaId) -> bool {
        self.participants.remove(arena_id);
        self.arenas.remove(arena_id).is_some()
    }

    pub fn find_active_arena_by_room(&self, room_id: &RoomId) -> Option<&Arena> {
        self.arenas
            .values()
            .find(|a| a.room_id == *room_id && a.is_active())
    }

    /// The active arena in which `user_id` currently holds `joined` status.
    pub fn find_active_arena_by_user(&self, user_id: &str) -> Option<&Arena> {
        self.participants.iter().find_map(|(arena_id, members)| {
            let joined = members.get(user_id).is_some_and(|p| p.is_joined());
            if !joined {
                return None;
            }
            self.arenas.get(arena_id).filter(|a| a.is_active())
        })
    }

    /// Arenas of a room, oldest first.
    pub fn list_arenas_by_room(&self, room_id: &RoomId) -> Vec<&Arena> {
        let mut arenas: Vec<&Arena> = self
            .arenas
            .values()
            .filter(|a| a.room_id == *room_id)
            .collect();
        arenas.sort_by_key(|a| (a.created_at, a.id));
        arenas
    }

    pub fn get_participant(&self, arena_id: &ArenaId, user_id: &str) -> Option<&ArenaParticipant> {
        self.participants.get(arena_id)?.get(user_id)
    }

    /// Insert or replace the record keyed by (arena id, user id).
    pub fn upsert_participant(&mut self, participant: ArenaParticipant) -> ArenaParticipant {
        let stored = participant.clone();
        self.participants
            .entry(participant.arena_id)
            .or_default()
            .insert(participant.user_id.clone(), participant);
        stored
    }

    /// Apply `f` to one participation record and stamp `updated_at`.
    pub fn update_participant(
        &mut self,
        arena_id: &ArenaId,
        user_id: &str,
        now: Timestamp,
        f: impl FnOnce(&mut ArenaParticipant),
    ) -> ArenaResult<ArenaParticipant> {
        let participant = self
            .participants
            .get_mut(arena_id)
            .and_then(|m| m.get_mut(user_id))
            .ok_or_else(|| ArenaError::ParticipantNotFound {
                arena_id: *arena_id,
                user_id: user_id.to_string(),
            })?;
        f(participant);
        participant.updated_at = now;
        Ok(participant.clone())
    }

    /// Apply `f` to every participation record of an arena.
    pub fn update_all_participants(
        &mut self,
        arena_id: &ArenaId,
        now: Timestamp,
        mut f: impl FnMut(&mut ArenaParticipant),
    ) {
        if let Some(members) = self.participants.get_mut(arena_id) {
            for p in members.values_mut() {
                f(p);
                p.updated_at = now;
            }
        }
    }

    pub fn update_participant_location(
        &mut self,
        arena_id: &ArenaId,
        user_id: &str,
        point: GeoPoint,
        now: Timestamp,
    ) -> ArenaResult<ArenaParticipant> {
        self.update_participant(arena_id, user_id, now, |p| {
            p.location = Some(point);
            p.location_updated_at = Some(now);
        })
    }

    /// All participation records of an arena, ordered by join time then user id.
    pub fn list_participants(&self, arena_id: &ArenaId) -> Vec<ArenaParticipant> {
        let mut list: Vec<ArenaParticipant> = self
            .participants
            .get(arena_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        list
    }

    /// Participants of an arena currently holding `joined` status.
    pub fn joined_participants(&self, arena_id: &ArenaId) -> Vec<ArenaParticipant> {
        let mut list = self.list_participants(arena_id);
        list.retain(|p| p.is_joined());
        list
    }

    pub fn counts(&self) -> ArenaCounts {
        let mut counts = ArenaCounts::default();
        for arena in self.arenas.values() {
            match arena.status {
                ArenaStatus::Lobby => counts.lobby += 1,
                ArenaStatus::Active => counts.active += 1,
                ArenaStatus::Ended => counts.ended += 1,
            }
        }
        counts
    }
}
