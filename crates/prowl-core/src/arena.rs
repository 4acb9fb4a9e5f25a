use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::room::{RoomId, UserId};
use crate::time::{MS_PER_MINUTE, Timestamp};

/// Opaque arena identifier.
pub type ArenaId = Uuid;

/// Shortest allowed arena duration, in minutes.
pub const MIN_DURATION_MINUTES: u32 = 1;

/// Longest allowed arena duration, in minutes.
pub const MAX_DURATION_MINUTES: u32 = 60;

/// Exactly this many prey must be joined for a `predators` arena to start.
pub const REQUIRED_PREY: usize = 1;

/// Minimum joined hunters for a `predators` arena to start.
pub const MIN_HUNTERS: usize = 1;

/// Maximum joined hunters for a `predators` arena to start.
pub const MAX_HUNTERS: usize = 12;

/// Game mode played inside an arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Hunters chase a single prey; capture by sustained proximity.
    #[default]
    Predators,
}

impl GameMode {
    /// Whether this mode runs the proximity capture engine while active.
    pub fn tracks_proximity(self) -> bool {
        match self {
            Self::Predators => true,
        }
    }
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Predators => write!(f, "predators"),
        }
    }
}

/// Lifecycle state of an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArenaStatus {
    Lobby,
    Active,
    Ended,
}

impl ArenaStatus {
    /// Whether moving from `self` to `next` is a legal lifecycle step.
    ///
    /// Transitions only move forward. A lobby may be ended directly
    /// (cancellation or a host ending before start).
    pub fn can_transition_to(self, next: ArenaStatus) -> bool {
        matches!(
            (self, next),
            (ArenaStatus::Lobby, ArenaStatus::Active)
                | (ArenaStatus::Lobby, ArenaStatus::Ended)
                | (ArenaStatus::Active, ArenaStatus::Ended)
        )
    }
}

impl std::fmt::Display for ArenaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lobby => write!(f, "lobby"),
            Self::Active => write!(f, "active"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// Side that won an ended arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WinnerTeam {
    Hunters,
    Prey,
}

/// Why an arena ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Capture,
    Timeout,
    HostEnded,
    AllLeft,
    Cancelled,
    Error,
}

impl EndReason {
    /// Reasons the server raises on its own, without a host request.
    pub fn is_system_detected(self) -> bool {
        matches!(self, Self::Capture | Self::Timeout | Self::AllLeft)
    }

    /// Winner implied by the reason when the caller supplies none.
    pub fn default_winner(self) -> Option<WinnerTeam> {
        match self {
            Self::Capture => Some(WinnerTeam::Hunters),
            Self::Timeout => Some(WinnerTeam::Prey),
            _ => None,
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Capture => "capture",
            Self::Timeout => "timeout",
            Self::HostEnded => "host_ended",
            Self::AllLeft => "all_left",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// One game session inside a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    pub id: ArenaId,
    pub room_id: RoomId,
    pub mode: GameMode,
    pub status: ArenaStatus,
    pub host_user_id: UserId,
    pub duration_minutes: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub ended_at: Option<Timestamp>,
    #[serde(default)]
    pub winner_team: Option<WinnerTeam>,
    #[serde(default)]
    pub ended_reason: Option<EndReason>,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl Arena {
    pub fn is_active(&self) -> bool {
        self.status == ArenaStatus::Active
    }

    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_user_id == user_id
    }

    /// Epoch millisecond at which the arena runs out of time, once started.
    pub fn deadline(&self) -> Option<Timestamp> {
        self.started_at
            .map(|start| start + u64::from(self.duration_minutes) * MS_PER_MINUTE)
    }
}

/// Check an arena duration against the allowed range.
pub fn is_valid_duration(minutes: u32) -> bool {
    (MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes)
}
