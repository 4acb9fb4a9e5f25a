use serde::{Deserialize, Serialize};

use crate::arena::ArenaId;
use crate::room::UserId;
use crate::time::Timestamp;

/// Role a participant plays in a `predators` arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Prey,
    Hunter,
    #[default]
    Spectator,
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prey => write!(f, "prey"),
            Self::Hunter => write!(f, "hunter"),
            Self::Spectator => write!(f, "spectator"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Joined,
    Left,
    Captured,
    Escaped,
    Disconnected,
}

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Build a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let lat_ok = latitude.is_finite() && (-90.0..=90.0).contains(&latitude);
        let lon_ok = longitude.is_finite() && (-180.0..=180.0).contains(&longitude);
        (lat_ok && lon_ok).then_some(Self {
            latitude,
            longitude,
        })
    }
}

/// A user's involvement in one specific arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaParticipant {
    pub arena_id: ArenaId,
    pub user_id: UserId,
    pub role: ParticipantRole,
    pub status: ParticipantStatus,
    pub joined_at: Timestamp,
    #[serde(default)]
    pub left_at: Option<Timestamp>,
    pub is_captured: bool,
    #[serde(default)]
    pub captured_at: Option<Timestamp>,
    #[serde(default)]
    pub captured_by: Option<UserId>,
    /// Last sampled position. Latitude and longitude are stored together.
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub location_updated_at: Option<Timestamp>,
    pub ble_broadcasting: bool,
    #[serde(default)]
    pub ble_started_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl ArenaParticipant {
    /// A fresh `joined` record.
    pub fn joined(arena_id: ArenaId, user_id: UserId, role: ParticipantRole, now: Timestamp) -> Self {
        Self {
            arena_id,
            user_id,
            role,
            status: ParticipantStatus::Joined,
            joined_at: now,
            left_at: None,
            is_captured: false,
            captured_at: None,
            captured_by: None,
            location: None,
            location_updated_at: None,
            ble_broadcasting: false,
            ble_started_at: None,
            updated_at: now,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.status == ParticipantStatus::Joined
    }

    pub fn is_prey(&self) -> bool {
        self.role == ParticipantRole::Prey
    }

    pub fn is_hunter(&self) -> bool {
        self.role == ParticipantRole::Hunter
    }

    /// Mark captured. The flag, timestamp and hunter are always set together.
    pub fn mark_captured(&mut self, hunter_id: UserId, now: Timestamp) {
        self.status = ParticipantStatus::Captured;
        self.is_captured = true;
        self.captured_at = Some(now);
        self.captured_by = Some(hunter_id);
        self.updated_at = now;
    }

    pub fn stop_broadcasting(&mut self, now: Timestamp) {
        if self.ble_broadcasting || self.ble_started_at.is_some() {
            self.ble_broadcasting = false;
            self.ble_started_at = None;
            self.updated_at = now;
        }
    }
}

/// Counts of joined participants per role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCounts {
    pub prey: usize,
    pub hunters: usize,
    pub spectators: usize,
}

impl RoleCounts {
    pub fn of<'a>(participants: impl IntoIterator<Item = &'a ArenaParticipant>) -> Self {
        let mut counts = Self::default();
        for p in participants.into_iter().filter(|p| p.is_joined()) {
            match p.role {
                ParticipantRole::Prey => counts.prey += 1,
                ParticipantRole::Hunter => counts.hunters += 1,
                ParticipantRole::Spectator => counts.spectators += 1,
            }
        }
        counts
    }
}
