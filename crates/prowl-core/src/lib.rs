pub mod arena;
pub mod error;
pub mod events;
pub mod geo;
pub mod participant;
pub mod room;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use uuid::Uuid;

    use crate::arena::{Arena, ArenaStatus, GameMode};
    use crate::geo::EARTH_RADIUS_M;
    use crate::participant::{ArenaParticipant, GeoPoint, ParticipantRole};
    use crate::room::RoomId;

    /// A lobby arena in `room_id` hosted by `host`, 12 minutes long.
    pub fn make_arena(room_id: RoomId, host: &str) -> Arena {
        Arena {
            id: Uuid::new_v4(),
            room_id,
            mode: GameMode::Predators,
            status: ArenaStatus::Lobby,
            host_user_id: host.to_string(),
            duration_minutes: 12,
            created_at: 1_000,
            updated_at: 1_000,
            started_at: None,
            ended_at: None,
            winner_team: None,
            ended_reason: None,
            settings: serde_json::Map::new(),
        }
    }

    /// A joined participant with the given role.
    pub fn make_participant(arena: &Arena, user: &str, role: ParticipantRole) -> ArenaParticipant {
        ArenaParticipant::joined(arena.id, user.to_string(), role, 1_000)
    }

    /// Test origin near a park in Lisbon.
    pub fn origin() -> GeoPoint {
        GeoPoint {
            latitude: 38.7223,
            longitude: -9.1393,
        }
    }

    /// A point `meters` due north of `base` along the meridian.
    pub fn north_of(base: GeoPoint, meters: f64) -> GeoPoint {
        let dlat = (meters / EARTH_RADIUS_M).to_degrees();
        GeoPoint {
            latitude: base.latitude + dlat,
            longitude: base.longitude,
        }
    }
}
