//! Participant lifecycle: join, leave, role assignment and location reports.

use prowl_core::arena::{Arena, ArenaId, ArenaStatus, EndReason};
use prowl_core::error::{ArenaError, ArenaResult};
use prowl_core::events::ArenaEvent;
use prowl_core::participant::{ArenaParticipant, GeoPoint, ParticipantRole, ParticipantStatus};
use prowl_core::time::timestamp_now;

use crate::service::{ArenaService, Caller};

impl ArenaService {
    /// Join an arena, defaulting to `spectator`.
    ///
    /// Joining while already joined returns the existing record untouched.
    /// A `left` record in a lobby arena is brought back to `joined`; once
    /// the arena is active, leaving is final.
    pub async fn join_arena(
        &self,
        arena_id: ArenaId,
        user_id: &str,
        role: Option<ParticipantRole>,
    ) -> ArenaResult<ArenaParticipant> {
        if user_id.trim().is_empty() {
            return Err(ArenaError::InvalidInput("user id is empty".to_string()));
        }

        let participant = {
            let mut repo = self.repo.write().await;
            let arena = repo.require_arena(&arena_id)?.clone();
            let existing = repo.get_participant(&arena_id, user_id).cloned();

            if let Some(p) = &existing {
                if p.is_joined() {
                    return Ok(p.clone());
                }
                if arena.is_active() {
                    return Err(ArenaError::CannotRejoinActive { arena_id });
                }
            }
            if arena.status != ArenaStatus::Lobby {
                return Err(ArenaError::ArenaNotInLobby {
                    arena_id,
                    status: arena.status,
                });
            }
            if !self.rooms.is_member(&arena.room_id, user_id) {
                return Err(ArenaError::NotMember {
                    room_id: arena.room_id,
                    user_id: user_id.to_string(),
                });
            }
            if let Some(other) = repo.find_active_arena_by_user(user_id) {
                return Err(ArenaError::AlreadyInActiveArena { arena_id: other.id });
            }

            let now = timestamp_now();
            let role = role.unwrap_or_default();
            let participant = match existing {
                Some(mut p) => {
                    p.status = ParticipantStatus::Joined;
                    p.role = role;
                    p.joined_at = now;
                    p.left_at = None;
                    p.updated_at = now;
                    p
                },
                None => ArenaParticipant::joined(arena_id, user_id.to_string(), role, now),
            };
            let participant = repo.upsert_participant(participant);
            self.events.publish(ArenaEvent::ParticipantJoined {
                arena_id,
                user_id: participant.user_id.clone(),
                role: participant.role,
            });
            participant
        };

        tracing::info!(
            arena = %arena_id,
            user = user_id,
            role = %participant.role,
            "Participant joined"
        );
        Ok(participant)
    }

    /// Leave an arena. Leaving twice, or leaving an ended arena, returns the
    /// record unchanged. When the last joined participant of an active arena
    /// leaves, the arena ends with `all_left`.
    pub async fn leave_arena(&self, arena_id: ArenaId, user_id: &str) -> ArenaResult<ArenaParticipant> {
        let (participant, everyone_left) = {
            let mut repo = self.repo.write().await;
            let arena = repo.require_arena(&arena_id)?.clone();
            let existing = repo
                .get_participant(&arena_id, user_id)
                .cloned()
                .ok_or_else(|| ArenaError::ParticipantNotFound {
                    arena_id,
                    user_id: user_id.to_string(),
                })?;
            if existing.status == ParticipantStatus::Left || arena.status == ArenaStatus::Ended {
                return Ok(existing);
            }

            let now = timestamp_now();
            let updated = repo.update_participant(&arena_id, user_id, now, |p| {
                p.status = ParticipantStatus::Left;
                p.left_at = Some(now);
                p.stop_broadcasting(now);
            })?;
            let everyone_left = arena.is_active() && repo.joined_participants(&arena_id).is_empty();
            self.events.publish(ArenaEvent::ParticipantLeft {
                arena_id,
                user_id: updated.user_id.clone(),
            });
            (updated, everyone_left)
        };

        tracing::info!(arena = %arena_id, user = user_id, "Participant left");

        if everyone_left {
            match self
                .end_arena(arena_id, &Caller::System, EndReason::AllLeft, None)
                .await
            {
                Ok(_) => {},
                Err(ArenaError::InvalidStateTransition { .. }) => {
                    tracing::debug!(arena = %arena_id, "Arena already ended when everyone left");
                },
                Err(e) => {
                    tracing::warn!(arena = %arena_id, error = %e, "All-left transition failed");
                },
            }
        }
        Ok(participant)
    }

    /// Host-only role change, lobby only.
    pub async fn assign_role(
        &self,
        arena_id: ArenaId,
        caller_user_id: &str,
        target_user_id: &str,
        role: ParticipantRole,
    ) -> ArenaResult<ArenaParticipant> {
        let participant = {
            let mut repo = self.repo.write().await;
            let arena = repo.require_arena(&arena_id)?;
            if !arena.is_host(caller_user_id) {
                return Err(ArenaError::NotHost {
                    arena_id,
                    user_id: caller_user_id.to_string(),
                });
            }
            if arena.status != ArenaStatus::Lobby {
                return Err(ArenaError::ArenaNotInLobby {
                    arena_id,
                    status: arena.status,
                });
            }
            let participant =
                repo.update_participant(&arena_id, target_user_id, timestamp_now(), |p| {
                    p.role = role;
                })?;
            self.events.publish(ArenaEvent::RoleAssigned {
                arena_id,
                user_id: participant.user_id.clone(),
                role,
            });
            participant
        };

        tracing::info!(
            arena = %arena_id,
            user = target_user_id,
            role = %role,
            "Role assigned"
        );
        Ok(participant)
    }

    /// Every participation record of an arena, in join order.
    pub async fn get_participants(&self, arena_id: ArenaId) -> ArenaResult<Vec<ArenaParticipant>> {
        let repo = self.repo.read().await;
        repo.require_arena(&arena_id)?;
        Ok(repo.list_participants(&arena_id))
    }

    /// The active arena in which the user is currently joined, if any.
    pub async fn get_user_active_arena(&self, user_id: &str) -> Option<Arena> {
        self.repo
            .read()
            .await
            .find_active_arena_by_user(user_id)
            .cloned()
    }

    /// Record a sampled position for a joined participant of an active arena.
    pub async fn report_location(
        &self,
        arena_id: ArenaId,
        user_id: &str,
        point: GeoPoint,
    ) -> ArenaResult<ArenaParticipant> {
        let Some(point) = GeoPoint::new(point.latitude, point.longitude) else {
            return Err(ArenaError::InvalidInput(format!(
                "coordinates out of range: ({}, {})",
                point.latitude, point.longitude
            )));
        };

        let mut repo = self.repo.write().await;
        let arena = repo.require_arena(&arena_id)?;
        if !arena.is_active() {
            return Err(ArenaError::InvalidStateTransition {
                arena_id,
                from: arena.status,
                to: ArenaStatus::Active,
            });
        }
        let joined = repo
            .get_participant(&arena_id, user_id)
            .is_some_and(ArenaParticipant::is_joined);
        if !joined {
            return Err(ArenaError::ParticipantNotFound {
                arena_id,
                user_id: user_id.to_string(),
            });
        }
        repo.update_participant_location(&arena_id, user_id, point, timestamp_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{fixture, ready_arena};
    use prowl_core::arena::GameMode;
    use prowl_core::test_helpers::origin;

    #[tokio::test]
    async fn join_defaults_to_spectator_and_is_idempotent() {
        let fx = fixture(&["u"]);
        let arena = ready_arena(&fx, "", &[]).await;

        let first = fx.service.join_arena(arena.id, "u", None).await.unwrap();
        assert_eq!(first.role, ParticipantRole::Spectator);
        assert_eq!(first.status, ParticipantStatus::Joined);

        let again = fx
            .service
            .join_arena(arena.id, "u", Some(ParticipantRole::Hunter))
            .await
            .unwrap();
        assert_eq!(again, first);
        assert_eq!(fx.service.get_participants(arena.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn join_requires_membership_and_known_arena() {
        let fx = fixture(&[]);
        let arena = ready_arena(&fx, "", &[]).await;
        let err = fx.service.join_arena(arena.id, "stranger", None).await.unwrap_err();
        assert!(matches!(err, ArenaError::NotMember { .. }));

        let missing = uuid::Uuid::new_v4();
        let err = fx.service.join_arena(missing, "host", None).await.unwrap_err();
        assert_eq!(err, ArenaError::ArenaNotFound { arena_id: missing });
    }

    #[tokio::test]
    async fn host_as_prey_scenario() {
        let fx = fixture(&["h1", "h2", "late"]);
        let arena = fx
            .service
            .create_arena(fx.room_id, "host", GameMode::Predators, 12)
            .await
            .unwrap();
        assert_eq!(arena.status, ArenaStatus::Lobby);

        fx.service
            .join_arena(arena.id, "host", Some(ParticipantRole::Prey))
            .await
            .unwrap();
        for h in ["h1", "h2"] {
            fx.service
                .join_arena(arena.id, h, Some(ParticipantRole::Hunter))
                .await
                .unwrap();
        }
        let started = fx.service.start_arena(arena.id, "host").await.unwrap();
        assert_eq!(started.status, ArenaStatus::Active);

        let prey = fx
            .service
            .get_participants(arena.id)
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.user_id == "host")
            .unwrap();
        assert!(prey.ble_broadcasting);

        let err = fx.service.join_arena(arena.id, "late", None).await.unwrap_err();
        assert_eq!(
            err,
            ArenaError::ArenaNotInLobby {
                arena_id: arena.id,
                status: ArenaStatus::Active
            }
        );
        fx.service.shutdown();
    }

    #[tokio::test]
    async fn cannot_join_while_active_elsewhere() {
        let fx = fixture(&["p", "h"]);
        let first = ready_arena(&fx, "p", &["h"]).await;
        fx.service.start_arena(first.id, "host").await.unwrap();

        let other_room = fx.rooms.create_room("Other", "host", None).unwrap();
        fx.rooms.add_member(&other_room.id, "h").unwrap();
        let second = fx
            .service
            .create_arena(other_room.id, "host", GameMode::Predators, 10)
            .await
            .unwrap();

        let err = fx.service.join_arena(second.id, "h", None).await.unwrap_err();
        assert_eq!(err, ArenaError::AlreadyInActiveArena { arena_id: first.id });
        fx.service.shutdown();
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let fx = fixture(&["u"]);
        let arena = ready_arena(&fx, "", &[]).await;
        fx.service.join_arena(arena.id, "u", None).await.unwrap();

        let left = fx.service.leave_arena(arena.id, "u").await.unwrap();
        assert_eq!(left.status, ParticipantStatus::Left);
        assert!(left.left_at.is_some());

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let again = fx.service.leave_arena(arena.id, "u").await.unwrap();
        assert_eq!(again.left_at, left.left_at);
        assert_eq!(again.updated_at, left.updated_at);

        let err = fx.service.leave_arena(arena.id, "nobody").await.unwrap_err();
        assert!(matches!(err, ArenaError::ParticipantNotFound { .. }));
    }

    #[tokio::test]
    async fn lobby_rejoin_resurrects_record() {
        let fx = fixture(&["u"]);
        let arena = ready_arena(&fx, "", &[]).await;
        fx.service.join_arena(arena.id, "u", None).await.unwrap();
        fx.service.leave_arena(arena.id, "u").await.unwrap();

        let back = fx
            .service
            .join_arena(arena.id, "u", Some(ParticipantRole::Hunter))
            .await
            .unwrap();
        assert_eq!(back.status, ParticipantStatus::Joined);
        assert_eq!(back.role, ParticipantRole::Hunter);
        assert!(back.left_at.is_none());
        assert_eq!(fx.service.get_participants(arena.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn leaving_active_arena_is_final() {
        let fx = fixture(&["p", "h1", "h2"]);
        let arena = ready_arena(&fx, "p", &["h1", "h2"]).await;
        fx.service.start_arena(arena.id, "host").await.unwrap();

        fx.service.leave_arena(arena.id, "h1").await.unwrap();
        let err = fx
            .service
            .join_arena(arena.id, "h1", Some(ParticipantRole::Hunter))
            .await
            .unwrap_err();
        assert_eq!(err, ArenaError::CannotRejoinActive { arena_id: arena.id });
        assert!(fx.service.get_arena(arena.id).await.unwrap().is_active());
        fx.service.shutdown();
    }

    #[tokio::test]
    async fn prey_leaving_stops_broadcast() {
        let fx = fixture(&["p", "h"]);
        let arena = ready_arena(&fx, "p", &["h"]).await;
        fx.service.start_arena(arena.id, "host").await.unwrap();

        let left = fx.service.leave_arena(arena.id, "p").await.unwrap();
        assert!(!left.ble_broadcasting);
        assert!(left.ble_started_at.is_none());
        fx.service.shutdown();
    }

    #[tokio::test]
    async fn everyone_leaving_ends_the_arena() {
        let fx = fixture(&["p", "h"]);
        let arena = ready_arena(&fx, "p", &["h"]).await;
        fx.service.start_arena(arena.id, "host").await.unwrap();

        fx.service.leave_arena(arena.id, "p").await.unwrap();
        assert!(fx.service.get_arena(arena.id).await.unwrap().is_active());
        fx.service.leave_arena(arena.id, "h").await.unwrap();

        let ended = fx.service.get_arena(arena.id).await.unwrap();
        assert_eq!(ended.status, ArenaStatus::Ended);
        assert_eq!(ended.ended_reason, Some(EndReason::AllLeft));
        assert_eq!(ended.winner_team, None);
        assert!(!fx.service.is_tracking(&arena.id));
    }

    #[tokio::test]
    async fn leaving_ended_arena_changes_nothing() {
        let fx = fixture(&["p", "h"]);
        let arena = ready_arena(&fx, "p", &["h"]).await;
        fx.service.start_arena(arena.id, "host").await.unwrap();
        fx.service.record_capture(arena.id, "h").await.unwrap();

        let prey = fx.service.leave_arena(arena.id, "p").await.unwrap();
        assert_eq!(prey.status, ParticipantStatus::Captured);
        assert!(prey.left_at.is_none());
    }

    #[tokio::test]
    async fn assign_role_is_host_only_and_lobby_only() {
        let fx = fixture(&["p", "h", "u"]);
        let arena = ready_arena(&fx, "p", &["h"]).await;
        fx.service.join_arena(arena.id, "u", None).await.unwrap();

        let err = fx
            .service
            .assign_role(arena.id, "p", "u", ParticipantRole::Hunter)
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::NotHost { .. }));

        let err = fx
            .service
            .assign_role(arena.id, "host", "ghost", ParticipantRole::Hunter)
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::ParticipantNotFound { .. }));

        let updated = fx
            .service
            .assign_role(arena.id, "host", "u", ParticipantRole::Hunter)
            .await
            .unwrap();
        assert_eq!(updated.role, ParticipantRole::Hunter);

        fx.service.start_arena(arena.id, "host").await.unwrap();
        let err = fx
            .service
            .assign_role(arena.id, "host", "u", ParticipantRole::Prey)
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::ArenaNotInLobby { .. }));
        fx.service.shutdown();
    }

    #[tokio::test]
    async fn user_active_arena_follows_lifecycle() {
        let fx = fixture(&["p", "h"]);
        let arena = ready_arena(&fx, "p", &["h"]).await;
        assert!(fx.service.get_user_active_arena("p").await.is_none());

        fx.service.start_arena(arena.id, "host").await.unwrap();
        assert_eq!(
            fx.service.get_user_active_arena("p").await.map(|a| a.id),
            Some(arena.id)
        );
        assert!(fx.service.get_user_active_arena("host").await.is_none());

        fx.service
            .end_arena(arena.id, &Caller::user("host"), EndReason::HostEnded, None)
            .await
            .unwrap();
        assert!(fx.service.get_user_active_arena("p").await.is_none());
    }

    #[tokio::test]
    async fn report_location_validates() {
        let fx = fixture(&["p", "h"]);
        let arena = ready_arena(&fx, "p", &["h"]).await;

        let err = fx
            .service
            .report_location(arena.id, "p", origin())
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::InvalidStateTransition { .. }));

        fx.service.start_arena(arena.id, "host").await.unwrap();
        let bad = GeoPoint {
            latitude: 91.0,
            longitude: 0.0,
        };
        let err = fx.service.report_location(arena.id, "p", bad).await.unwrap_err();
        assert!(matches!(err, ArenaError::InvalidInput(_)));

        let err = fx
            .service
            .report_location(arena.id, "host", origin())
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::ParticipantNotFound { .. }));

        let updated = fx
            .service
            .report_location(arena.id, "p", origin())
            .await
            .unwrap();
        assert_eq!(updated.location, Some(origin()));
        assert!(updated.location_updated_at.is_some());
        fx.service.shutdown();
    }
}
