use serde::{Deserialize, Serialize};

use crate::arena::{ArenaId, EndReason, GameMode, WinnerTeam};
use crate::participant::ParticipantRole;
use crate::room::{RoomId, UserId};
use crate::time::Timestamp;

/// Lifecycle notifications pushed to subscribers. Delivery is best-effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArenaEvent {
    ArenaCreated {
        arena_id: ArenaId,
        room_id: RoomId,
        host_user_id: UserId,
        mode: GameMode,
        duration_minutes: u32,
    },
    ArenaStarted {
        arena_id: ArenaId,
        started_at: Timestamp,
        deadline: Timestamp,
    },
    ArenaEnded {
        arena_id: ArenaId,
        reason: EndReason,
        winner_team: Option<WinnerTeam>,
        ended_at: Timestamp,
    },
    ParticipantJoined {
        arena_id: ArenaId,
        user_id: UserId,
        role: ParticipantRole,
    },
    ParticipantLeft {
        arena_id: ArenaId,
        user_id: UserId,
    },
    RoleAssigned {
        arena_id: ArenaId,
        user_id: UserId,
        role: ParticipantRole,
    },
    PreyCaptured {
        arena_id: ArenaId,
        prey_user_id: UserId,
        hunter_user_id: Option<UserId>,
        captured_at: Timestamp,
    },
}

impl ArenaEvent {
    pub fn arena_id(&self) -> ArenaId {
        match self {
            Self::ArenaCreated { arena_id, .. }
            | Self::ArenaStarted { arena_id, .. }
            | Self::ArenaEnded { arena_id, .. }
            | Self::ParticipantJoined { arena_id, .. }
            | Self::ParticipantLeft { arena_id, .. }
            | Self::RoleAssigned { arena_id, .. }
            | Self::PreyCaptured { arena_id, .. } => *arena_id,
        }
    }

    /// Short name used as the SSE event field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ArenaCreated { .. } => "arena_created",
            Self::ArenaStarted { .. } => "arena_started",
            Self::ArenaEnded { .. } => "arena_ended",
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::ParticipantLeft { .. } => "participant_left",
            Self::RoleAssigned { .. } => "role_assigned",
            Self::PreyCaptured { .. } => "prey_captured",
        }
    }
}
