use serde::Serialize;

use crate::arena::{ArenaId, ArenaStatus, MAX_HUNTERS, MIN_HUNTERS, REQUIRED_PREY};
use crate::room::{RoomId, UserId};

/// Coarse category of an [`ArenaError`], used for HTTP status mapping and
/// client-side branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Authorization,
    Validation,
    StateConflict,
    Internal,
}

/// Every failure an arena operation can report. State-conflict variants
/// carry the ids and counts a caller needs to redirect or retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    ArenaNotFound {
        arena_id: ArenaId,
    },
    RoomNotFound {
        room_id: RoomId,
    },
    ParticipantNotFound {
        arena_id: ArenaId,
        user_id: UserId,
    },
    NotMember {
        room_id: RoomId,
        user_id: UserId,
    },
    NotHost {
        arena_id: ArenaId,
        user_id: UserId,
    },
    NotOwner {
        room_id: RoomId,
        user_id: UserId,
    },
    InvalidInput(String),
    InvalidStateTransition {
        arena_id: ArenaId,
        from: ArenaStatus,
        to: ArenaStatus,
    },
    ActiveArenaExists {
        room_id: RoomId,
        arena_id: ArenaId,
    },
    InvalidRoles {
        prey: usize,
        hunters: usize,
    },
    ParticipantInActiveArena {
        user_id: UserId,
        arena_id: ArenaId,
    },
    ArenaNotInLobby {
        arena_id: ArenaId,
        status: ArenaStatus,
    },
    AlreadyInActiveArena {
        arena_id: ArenaId,
    },
    CannotRejoinActive {
        arena_id: ArenaId,
    },
    Internal(String),
}

impl ArenaError {
    /// Stable identifier for programmatic branching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ArenaNotFound { .. } => "ARENA_NOT_FOUND",
            Self::RoomNotFound { .. } => "ROOM_NOT_FOUND",
            Self::ParticipantNotFound { .. } => "PARTICIPANT_NOT_FOUND",
            Self::NotMember { .. } => "NOT_MEMBER",
            Self::NotHost { .. } => "NOT_HOST",
            Self::NotOwner { .. } => "NOT_OWNER",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::ActiveArenaExists { .. } => "ACTIVE_ARENA_EXISTS",
            Self::InvalidRoles { .. } => "INVALID_ROLES",
            Self::ParticipantInActiveArena { .. } => "PARTICIPANT_IN_ACTIVE_ARENA",
            Self::ArenaNotInLobby { .. } => "ARENA_NOT_IN_LOBBY",
            Self::AlreadyInActiveArena { .. } => "ALREADY_IN_ACTIVE_ARENA",
            Self::CannotRejoinActive { .. } => "CANNOT_REJOIN_ACTIVE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArenaNotFound { .. }
            | Self::RoomNotFound { .. }
            | Self::ParticipantNotFound { .. } => ErrorKind::NotFound,
            Self::NotMember { .. } | Self::NotHost { .. } | Self::NotOwner { .. } => {
                ErrorKind::Authorization
            },
            Self::InvalidInput(_) => ErrorKind::Validation,
            Self::InvalidStateTransition { .. }
            | Self::ActiveArenaExists { .. }
            | Self::InvalidRoles { .. }
            | Self::ParticipantInActiveArena { .. }
            | Self::ArenaNotInLobby { .. }
            | Self::AlreadyInActiveArena { .. }
            | Self::CannotRejoinActive { .. } => ErrorKind::StateConflict,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Structured detail for the caller, e.g. the conflicting arena id.
    pub fn details(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Self::ArenaNotFound { arena_id } => json!({ "arena_id": arena_id }),
            Self::RoomNotFound { room_id } => json!({ "room_id": room_id }),
            Self::ParticipantNotFound { arena_id, user_id } => {
                json!({ "arena_id": arena_id, "user_id": user_id })
            },
            Self::NotMember { room_id, user_id } | Self::NotOwner { room_id, user_id } => {
                json!({ "room_id": room_id, "user_id": user_id })
            },
            Self::NotHost { arena_id, user_id } => {
                json!({ "arena_id": arena_id, "user_id": user_id })
            },
            Self::InvalidInput(_) | Self::Internal(_) => serde_json::Value::Null,
            Self::InvalidStateTransition { arena_id, from, to } => {
                json!({ "arena_id": arena_id, "from": from, "to": to })
            },
            Self::ActiveArenaExists { room_id, arena_id } => {
                json!({ "room_id": room_id, "arena_id": arena_id })
            },
            Self::InvalidRoles { prey, hunters } => json!({
                "observed": { "prey": prey, "hunters": hunters },
                "required": {
                    "prey": REQUIRED_PREY,
                    "min_hunters": MIN_HUNTERS,
                    "max_hunters": MAX_HUNTERS,
                },
            }),
            Self::ParticipantInActiveArena { user_id, arena_id } => {
                json!({ "user_id": user_id, "arena_id": arena_id })
            },
            Self::ArenaNotInLobby { arena_id, status } => {
                json!({ "arena_id": arena_id, "status": status })
            },
            Self::AlreadyInActiveArena { arena_id } | Self::CannotRejoinActive { arena_id } => {
                json!({ "arena_id": arena_id })
            },
        }
    }
}

impl std::fmt::Display for ArenaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ArenaNotFound { arena_id } => write!(f, "arena {arena_id} not found"),
            Self::RoomNotFound { room_id } => write!(f, "room {room_id} not found"),
            Self::ParticipantNotFound { arena_id, user_id } => {
                write!(f, "user {user_id} is not a participant of arena {arena_id}")
            },
            Self::NotMember { room_id, user_id } => {
                write!(f, "user {user_id} is not a member of room {room_id}")
            },
            Self::NotHost { arena_id, user_id } => {
                write!(f, "user {user_id} is not the host of arena {arena_id}")
            },
            Self::NotOwner { room_id, user_id } => {
                write!(f, "user {user_id} does not own room {room_id}")
            },
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::InvalidStateTransition { arena_id, from, to } => {
                write!(f, "arena {arena_id} cannot move from {from} to {to}")
            },
            Self::ActiveArenaExists { room_id, arena_id } => {
                write!(f, "room {room_id} already has active arena {arena_id}")
            },
            Self::InvalidRoles { prey, hunters } => write!(
                f,
                "invalid roles: {prey} prey and {hunters} hunters \
                 (need {REQUIRED_PREY} prey and {MIN_HUNTERS}-{MAX_HUNTERS} hunters)"
            ),
            Self::ParticipantInActiveArena { user_id, arena_id } => {
                write!(f, "user {user_id} is already playing in active arena {arena_id}")
            },
            Self::ArenaNotInLobby { arena_id, status } => {
                write!(f, "arena {arena_id} is {status}, not in lobby")
            },
            Self::AlreadyInActiveArena { arena_id } => {
                write!(f, "already playing in active arena {arena_id}")
            },
            Self::CannotRejoinActive { arena_id } => {
                write!(f, "cannot rejoin arena {arena_id} after leaving while it is active")
            },
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ArenaError {}

/// Result alias for arena operations.
pub type ArenaResult<T> = Result<T, ArenaError>;
