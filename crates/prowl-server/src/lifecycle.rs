//! Arena state machine: create, start, end and cancel.
//!
//! Every operation validates and writes under one repository write guard,
//! so the one-active-arena-per-room and one-active-arena-per-user
//! invariants cannot be raced by concurrent callers.

use prowl_core::arena::{
    Arena, ArenaId, ArenaStatus, EndReason, GameMode, MAX_DURATION_MINUTES, MAX_HUNTERS,
    MIN_DURATION_MINUTES, MIN_HUNTERS, REQUIRED_PREY, WinnerTeam, is_valid_duration,
};
use prowl_core::error::{ArenaError, ArenaResult};
use prowl_core::events::ArenaEvent;
use prowl_core::participant::{ArenaParticipant, ParticipantStatus, RoleCounts};
use prowl_core::room::{RoomId, UserId};
use prowl_core::time::timestamp_now;

use crate::service::{ArenaService, Caller};

/// How an arena should be ended, beyond who asked.
struct EndRequest {
    reason: EndReason,
    winner: Option<WinnerTeam>,
    capturing_hunter: Option<UserId>,
    lobby_only: bool,
}

impl ArenaService {
    /// Create an arena in `lobby` for a room member.
    pub async fn create_arena(
        &self,
        room_id: RoomId,
        host_user_id: &str,
        mode: GameMode,
        duration_minutes: u32,
    ) -> ArenaResult<Arena> {
        self.create_arena_with_settings(
            room_id,
            host_user_id,
            mode,
            duration_minutes,
            serde_json::Map::new(),
        )
        .await
    }

    pub async fn create_arena_with_settings(
        &self,
        room_id: RoomId,
        host_user_id: &str,
        mode: GameMode,
        duration_minutes: u32,
        settings: serde_json::Map<String, serde_json::Value>,
    ) -> ArenaResult<Arena> {
        if !is_valid_duration(duration_minutes) {
            return Err(ArenaError::InvalidInput(format!(
                "duration must be {MIN_DURATION_MINUTES}-{MAX_DURATION_MINUTES} minutes, \
                 got {duration_minutes}"
            )));
        }
        if host_user_id.trim().is_empty() {
            return Err(ArenaError::InvalidInput("host user id is empty".to_string()));
        }
        if !self.rooms.room_exists(&room_id) {
            return Err(ArenaError::RoomNotFound { room_id });
        }
        if !self.rooms.is_member(&room_id, host_user_id) {
            return Err(ArenaError::NotMember {
                room_id,
                user_id: host_user_id.to_string(),
            });
        }

        let arena = {
            let mut repo = self.repo.write().await;
            if let Some(active) = repo.find_active_arena_by_room(&room_id) {
                return Err(ArenaError::ActiveArenaExists {
                    room_id,
                    arena_id: active.id,
                });
            }
            let arena = repo.insert_arena(
                room_id,
                host_user_id,
                mode,
                duration_minutes,
                settings,
                timestamp_now(),
            );
            self.events.publish(ArenaEvent::ArenaCreated {
                arena_id: arena.id,
                room_id,
                host_user_id: arena.host_user_id.clone(),
                mode,
                duration_minutes,
            });
            arena
        };

        tracing::info!(
            arena = %arena.id,
            room = %room_id,
            host = host_user_id,
            mode = %mode,
            duration_minutes,
            "Arena created"
        );
        Ok(arena)
    }

    pub async fn get_arena(&self, arena_id: ArenaId) -> ArenaResult<Arena> {
        self.repo.read().await.require_arena(&arena_id).cloned()
    }

    /// Arenas of a room, oldest first.
    pub async fn list_room_arenas(&self, room_id: RoomId) -> Vec<Arena> {
        let repo = self.repo.read().await;
        repo.list_arenas_by_room(&room_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Delete every arena of a room along with its participants, ahead of
    /// the room itself going away. Refused while one of them is active.
    pub async fn remove_room_arenas(&self, room_id: RoomId) -> ArenaResult<usize> {
        let mut repo = self.repo.write().await;
        if let Some(active) = repo.find_active_arena_by_room(&room_id) {
            return Err(ArenaError::ActiveArenaExists {
                room_id,
                arena_id: active.id,
            });
        }
        let ids: Vec<ArenaId> = repo
            .list_arenas_by_room(&room_id)
            .into_iter()
            .map(|a| a.id)
            .collect();
        for id in &ids {
            self.stop_background_tasks(id);
            repo.delete_arena(id);
        }
        tracing::info!(room = %room_id, removed = ids.len(), "Room arenas removed");
        Ok(ids.len())
    }

    /// Move a lobby arena to `active`. Host only.
    pub async fn start_arena(&self, arena_id: ArenaId, caller_user_id: &str) -> ArenaResult<Arena> {
        let arena = {
            let mut repo = self.repo.write().await;
            let current = repo.require_arena(&arena_id)?.clone();

            if current.status != ArenaStatus::Lobby {
                return Err(ArenaError::InvalidStateTransition {
                    arena_id,
                    from: current.status,
                    to: ArenaStatus::Active,
                });
            }
            if !current.is_host(caller_user_id) {
                return Err(ArenaError::NotHost {
                    arena_id,
                    user_id: caller_user_id.to_string(),
                });
            }
            if let Some(other) = repo.find_active_arena_by_room(&current.room_id)
                && other.id != arena_id
            {
                return Err(ArenaError::ActiveArenaExists {
                    room_id: current.room_id,
                    arena_id: other.id,
                });
            }

            let joined = repo.joined_participants(&arena_id);
            validate_roles(current.mode, &joined)?;

            for p in &joined {
                if let Some(other) = repo.find_active_arena_by_user(&p.user_id)
                    && other.id != arena_id
                {
                    return Err(ArenaError::ParticipantInActiveArena {
                        user_id: p.user_id.clone(),
                        arena_id: other.id,
                    });
                }
            }

            let now = timestamp_now();
            let arena = {
                let arena =
                    repo.transition_status(&arena_id, ArenaStatus::Lobby, ArenaStatus::Active, now)?;
                arena.started_at = Some(now);
                arena.clone()
            };
            if let Some(prey) = joined.iter().find(|p| p.is_prey()) {
                repo.update_participant(&arena_id, &prey.user_id, now, |p| {
                    p.ble_broadcasting = true;
                    p.ble_started_at = Some(now);
                })?;
            }

            // Tasks and the event are registered while the guard is held so a
            // racing end always finds the tasks to stop and is published after.
            self.start_background_tasks(&arena);
            self.events.publish(ArenaEvent::ArenaStarted {
                arena_id,
                started_at: now,
                deadline: arena.deadline().unwrap_or(now),
            });
            arena
        };

        self.locations.initialize_locations(arena_id);

        tracing::info!(
            arena = %arena_id,
            room = %arena.room_id,
            duration_minutes = arena.duration_minutes,
            "Arena started"
        );
        Ok(arena)
    }

    /// End an arena. The host may end for any reason but `capture`, which
    /// only the capture engine records; the system may raise `timeout` and
    /// `all_left`. `timeout` applies to active arenas only.
    ///
    /// Ending an already ended arena fails with `InvalidStateTransition`,
    /// which background callers treat as "already handled".
    pub async fn end_arena(
        &self,
        arena_id: ArenaId,
        caller: &Caller,
        reason: EndReason,
        winner: Option<WinnerTeam>,
    ) -> ArenaResult<Arena> {
        if reason == EndReason::Capture {
            return Err(ArenaError::InvalidInput(
                "capture is recorded by the capture engine and cannot be requested".to_string(),
            ));
        }
        self.finish_arena(
            arena_id,
            caller,
            EndRequest {
                reason,
                winner,
                capturing_hunter: None,
                lobby_only: false,
            },
        )
        .await
    }

    /// Host cancellation of an arena that has not started.
    pub async fn cancel_arena(&self, arena_id: ArenaId, caller_user_id: &str) -> ArenaResult<Arena> {
        self.finish_arena(
            arena_id,
            &Caller::user(caller_user_id),
            EndRequest {
                reason: EndReason::Cancelled,
                winner: None,
                capturing_hunter: None,
                lobby_only: true,
            },
        )
        .await
    }

    /// End transition raised by the capture engine on behalf of `hunter_id`.
    pub(crate) async fn record_capture(&self, arena_id: ArenaId, hunter_id: &str) -> ArenaResult<Arena> {
        self.finish_arena(
            arena_id,
            &Caller::System,
            EndRequest {
                reason: EndReason::Capture,
                winner: Some(WinnerTeam::Hunters),
                capturing_hunter: Some(hunter_id.to_string()),
                lobby_only: false,
            },
        )
        .await
    }

    async fn finish_arena(
        &self,
        arena_id: ArenaId,
        caller: &Caller,
        request: EndRequest,
    ) -> ArenaResult<Arena> {
        let EndRequest {
            reason,
            winner,
            capturing_hunter,
            lobby_only,
        } = request;

        let arena = {
            let mut repo = self.repo.write().await;
            let current = repo.require_arena(&arena_id)?.clone();

            let blocked = current.status == ArenaStatus::Ended
                || (lobby_only && current.status != ArenaStatus::Lobby);
            if blocked {
                return Err(ArenaError::InvalidStateTransition {
                    arena_id,
                    from: current.status,
                    to: ArenaStatus::Ended,
                });
            }
            authorize_end(&current, caller, reason)?;
            if matches!(reason, EndReason::Capture | EndReason::Timeout)
                && current.status != ArenaStatus::Active
            {
                return Err(ArenaError::InvalidInput(format!(
                    "{reason} only ends an active arena"
                )));
            }

            let now = timestamp_now();
            let winner = winner.or(reason.default_winner());
            let arena = {
                let arena =
                    repo.transition_status(&arena_id, current.status, ArenaStatus::Ended, now)?;
                arena.ended_at = Some(now);
                arena.ended_reason = Some(reason);
                arena.winner_team = winner;
                arena.clone()
            };

            repo.update_all_participants(&arena_id, now, |p| p.stop_broadcasting(now));

            let prey = repo
                .joined_participants(&arena_id)
                .into_iter()
                .find(ArenaParticipant::is_prey);
            let mut captured = None;
            match (reason, winner, prey, capturing_hunter) {
                (EndReason::Capture, Some(WinnerTeam::Hunters), Some(prey), Some(hunter)) => {
                    let updated = repo.update_participant(&arena_id, &prey.user_id, now, |p| {
                        p.mark_captured(hunter, now);
                    })?;
                    captured = Some(updated);
                },
                (EndReason::Timeout, Some(WinnerTeam::Prey), Some(prey), _) => {
                    repo.update_participant(&arena_id, &prey.user_id, now, |p| {
                        p.status = ParticipantStatus::Escaped;
                    })?;
                },
                _ => {},
            }

            self.stop_background_tasks(&arena_id);
            if let Some(prey) = captured {
                self.events.publish(ArenaEvent::PreyCaptured {
                    arena_id,
                    prey_user_id: prey.user_id,
                    hunter_user_id: prey.captured_by,
                    captured_at: now,
                });
            }
            self.events.publish(ArenaEvent::ArenaEnded {
                arena_id,
                reason,
                winner_team: arena.winner_team,
                ended_at: now,
            });
            arena
        };

        tracing::info!(
            arena = %arena_id,
            reason = %reason,
            winner = ?arena.winner_team,
            caller = caller.label(),
            "Arena ended"
        );
        Ok(arena)
    }
}

fn authorize_end(arena: &Arena, caller: &Caller, reason: EndReason) -> ArenaResult<()> {
    match caller {
        Caller::User(user_id) if arena.is_host(user_id) => Ok(()),
        Caller::System if reason.is_system_detected() => Ok(()),
        _ => Err(ArenaError::NotHost {
            arena_id: arena.id,
            user_id: caller.label().to_string(),
        }),
    }
}

/// Role requirements for starting an arena in `mode`.
fn validate_roles(mode: GameMode, joined: &[ArenaParticipant]) -> ArenaResult<()> {
    match mode {
        GameMode::Predators => {
            let counts = RoleCounts::of(joined);
            let hunters_ok = (MIN_HUNTERS..=MAX_HUNTERS).contains(&counts.hunters);
            if counts.prey != REQUIRED_PREY || !hunters_ok {
                return Err(ArenaError::InvalidRoles {
                    prey: counts.prey,
                    hunters: counts.hunters,
                });
            }
            Ok(())
        },
    }
}
