//! Proximity capture engine.
//!
//! One instance per active `predators` arena. Each tick reads the joined
//! participants, measures every hunter's great-circle distance to the prey
//! and fires a capture once a hunter has stayed within range for the hold
//! duration.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use prowl_core::arena::ArenaId;
use prowl_core::geo::distance_between;
use prowl_core::participant::ArenaParticipant;
use prowl_core::room::UserId;

use crate::config::CaptureConfig;
use crate::service::ArenaService;
use crate::supervisor::TaskCommand;

/// Tunables for the capture engine.
#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    pub poll_interval: Duration,
    /// A hunter at or under this distance counts as "near".
    pub capture_distance_m: f64,
    /// How long a hunter must stay near before the capture fires.
    pub hold: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1500),
            capture_distance_m: 2.5,
            hold: Duration::from_millis(1500),
        }
    }
}

impl From<&CaptureConfig> for CaptureSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            capture_distance_m: config.capture_distance_m,
            hold: Duration::from_millis(config.hold_ms),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct HunterProximity {
    last_distance_m: Option<f64>,
    near_since: Option<Instant>,
}

/// Result of evaluating one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No prey or no prey location; nothing was evaluated.
    Skipped,
    /// Distances updated, nobody has held range long enough.
    Tracking,
    /// `hunter_id` held range for the full hold duration.
    Capture { hunter_id: UserId, distance_m: f64 },
}

/// Per-hunter proximity timing. Scratch state, rebuilt on every start.
#[derive(Debug)]
pub struct ProximityTracker {
    settings: CaptureSettings,
    hunters: HashMap<UserId, HunterProximity>,
}

impl ProximityTracker {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            hunters: HashMap::new(),
        }
    }

    /// Evaluate one snapshot of the arena's participants taken at `now`.
    ///
    /// Hunters are evaluated in user id order and the first one to complete
    /// its hold wins; later hunters are not evaluated on that tick.
    pub fn observe(&mut self, participants: &[ArenaParticipant], now: Instant) -> TickOutcome {
        let Some(prey) = participants.iter().find(|p| p.is_joined() && p.is_prey()) else {
            return TickOutcome::Skipped;
        };
        let Some(prey_at) = prey.location else {
            return TickOutcome::Skipped;
        };

        let mut hunters: Vec<&ArenaParticipant> = participants
            .iter()
            .filter(|p| p.is_joined() && p.is_hunter())
            .collect();
        hunters.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        self.hunters
            .retain(|id, _| hunters.iter().any(|h| h.user_id == *id));

        for hunter in hunters {
            let entry = self
                .hunters
                .entry(hunter.user_id.clone())
                .or_insert(HunterProximity {
                    last_distance_m: None,
                    near_since: None,
                });

            // Missing signal counts as having moved away
            let Some(hunter_at) = hunter.location else {
                entry.near_since = None;
                continue;
            };

            let distance_m = distance_between(hunter_at, prey_at);
            entry.last_distance_m = Some(distance_m);

            if distance_m > self.settings.capture_distance_m {
                entry.near_since = None;
                continue;
            }

            match entry.near_since {
                None => entry.near_since = Some(now),
                Some(since) if now.duration_since(since) >= self.settings.hold => {
                    return TickOutcome::Capture {
                        hunter_id: hunter.user_id.clone(),
                        distance_m,
                    };
                },
                Some(_) => {},
            }
        }
        TickOutcome::Tracking
    }

    pub fn distance_of(&self, hunter_id: &str) -> Option<f64> {
        self.hunters.get(hunter_id)?.last_distance_m
    }

    pub fn min_distance(&self) -> Option<f64> {
        self.hunters
            .values()
            .filter_map(|h| h.last_distance_m)
            .min_by(f64::total_cmp)
    }
}

/// Tracker state shared between an engine task and distance queries.
#[derive(Debug)]
pub struct CaptureShared {
    tracker: Mutex<ProximityTracker>,
    /// Set once a capture has been handed to the state machine.
    capture_fired: AtomicBool,
}

impl CaptureShared {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            tracker: Mutex::new(ProximityTracker::new(settings)),
            capture_fired: AtomicBool::new(false),
        }
    }

    fn observe(&self, participants: &[ArenaParticipant], now: Instant) -> TickOutcome {
        self.tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(participants, now)
    }

    /// Claim the capture latch. Returns false if a capture is already in flight.
    fn try_fire(&self) -> bool {
        self.capture_fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn reset_latch(&self) {
        self.capture_fired.store(false, Ordering::Release);
    }

    pub fn hunter_distance(&self, hunter_id: &str) -> Option<f64> {
        self.tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .distance_of(hunter_id)
    }

    pub fn min_distance(&self) -> Option<f64> {
        self.tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .min_distance()
    }
}

/// Spawn the capture engine for an arena as a tokio task.
pub fn spawn_capture_engine(
    service: ArenaService,
    arena_id: ArenaId,
    shared: Arc<CaptureShared>,
    command_rx: mpsc::UnboundedReceiver<TaskCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_capture_loop(service, arena_id, shared, command_rx).await;
    })
}

async fn run_capture_loop(
    service: ArenaService,
    arena_id: ArenaId,
    shared: Arc<CaptureShared>,
    mut command_rx: mpsc::UnboundedReceiver<TaskCommand>,
) {
    let mut interval = tokio::time::interval(service.settings.capture.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tracing::debug!(arena = %arena_id, "Capture engine running");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(participants) = tracked_participants(&service, &arena_id).await else {
                    break;
                };
                let flow =
                    evaluate_tick(&service, arena_id, &shared, &participants, Instant::now()).await;
                if flow.is_break() {
                    break;
                }
            }
            cmd = command_rx.recv() => {
                match cmd {
                    Some(TaskCommand::Stop) | None => break,
                }
            }
        }
    }

    tracing::debug!(arena = %arena_id, "Capture engine stopped");
}

/// Joined participants of an arena the engine should still track, or `None`
/// once it left `active`.
async fn tracked_participants(
    service: &ArenaService,
    arena_id: &ArenaId,
) -> Option<Vec<ArenaParticipant>> {
    let repo = service.repo.read().await;
    let tracked = repo
        .get_arena(arena_id)
        .is_some_and(|a| a.is_active() && a.mode.tracks_proximity());
    tracked.then(|| repo.joined_participants(arena_id))
}

/// Run one tick over a participant snapshot. Breaks once the capture has
/// been recorded; a failed capture resets the latch and keeps running.
async fn evaluate_tick(
    service: &ArenaService,
    arena_id: ArenaId,
    shared: &CaptureShared,
    participants: &[ArenaParticipant],
    now: Instant,
) -> ControlFlow<()> {
    let TickOutcome::Capture { hunter_id, distance_m } = shared.observe(participants, now) else {
        return ControlFlow::Continue(());
    };
    if !shared.try_fire() {
        return ControlFlow::Continue(());
    }

    tracing::info!(
        arena = %arena_id,
        hunter = %hunter_id,
        distance_m,
        "Capture detected"
    );
    match service.record_capture(arena_id, &hunter_id).await {
        Ok(_) => ControlFlow::Break(()),
        Err(e) => {
            tracing::warn!(arena = %arena_id, error = %e, "Capture transition failed");
            shared.reset_latch();
            ControlFlow::Continue(())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{fast_settings, fixture_with, ready_arena};
    use crate::service::{Caller, ServiceSettings};
    use prowl_core::arena::{ArenaStatus, EndReason, WinnerTeam};
    use prowl_core::events::ArenaEvent;
    use prowl_core::participant::{ParticipantRole, ParticipantStatus};
    use prowl_core::test_helpers::{make_arena, make_participant, north_of, origin};
    use uuid::Uuid;

    fn settings() -> CaptureSettings {
        CaptureSettings {
            poll_interval: Duration::from_millis(100),
            capture_distance_m: 2.5,
            hold: Duration::from_millis(1500),
        }
    }

    fn located(user: &str, role: ParticipantRole, meters_north: Option<f64>) -> ArenaParticipant {
        let arena = make_arena(Uuid::nil(), "host");
        let mut p = make_participant(&arena, user, role);
        p.location = meters_north.map(|m| north_of(origin(), m));
        p
    }

    #[test]
    fn capture_fires_after_hold() {
        let mut tracker = ProximityTracker::new(settings());
        let t0 = Instant::now();
        let snapshot = [
            located("prey", ParticipantRole::Prey, Some(0.0)),
            located("h1", ParticipantRole::Hunter, Some(1.0)),
        ];

        assert_eq!(tracker.observe(&snapshot, t0), TickOutcome::Tracking);
        assert_eq!(
            tracker.observe(&snapshot, t0 + Duration::from_millis(1000)),
            TickOutcome::Tracking
        );
        match tracker.observe(&snapshot, t0 + Duration::from_millis(1500)) {
            TickOutcome::Capture { hunter_id, distance_m } => {
                assert_eq!(hunter_id, "h1");
                assert!(distance_m <= 2.5);
            },
            other => panic!("expected capture, got {other:?}"),
        }
    }

    #[test]
    fn leaving_range_resets_hold() {
        let mut tracker = ProximityTracker::new(settings());
        let t0 = Instant::now();
        let near = [
            located("prey", ParticipantRole::Prey, Some(0.0)),
            located("h1", ParticipantRole::Hunter, Some(1.0)),
        ];
        let far = [
            located("prey", ParticipantRole::Prey, Some(0.0)),
            located("h1", ParticipantRole::Hunter, Some(10.0)),
        ];

        tracker.observe(&near, t0);
        tracker.observe(&far, t0 + Duration::from_millis(1000));
        // Re-entry at 1200 ms starts a fresh hold
        assert_eq!(
            tracker.observe(&near, t0 + Duration::from_millis(1200)),
            TickOutcome::Tracking
        );
        assert_eq!(
            tracker.observe(&near, t0 + Duration::from_millis(2600)),
            TickOutcome::Tracking
        );
        assert!(matches!(
            tracker.observe(&near, t0 + Duration::from_millis(2700)),
            TickOutcome::Capture { .. }
        ));
    }

    #[test]
    fn missing_hunter_location_resets_hold() {
        let mut tracker = ProximityTracker::new(settings());
        let t0 = Instant::now();
        let near = [
            located("prey", ParticipantRole::Prey, Some(0.0)),
            located("h1", ParticipantRole::Hunter, Some(1.0)),
        ];
        let lost = [
            located("prey", ParticipantRole::Prey, Some(0.0)),
            located("h1", ParticipantRole::Hunter, None),
        ];

        tracker.observe(&near, t0);
        tracker.observe(&lost, t0 + Duration::from_millis(800));
        assert_eq!(
            tracker.observe(&near, t0 + Duration::from_millis(1600)),
            TickOutcome::Tracking
        );
    }

    #[test]
    fn skips_without_prey_or_prey_location() {
        let mut tracker = ProximityTracker::new(settings());
        let now = Instant::now();
        let no_prey = [located("h1", ParticipantRole::Hunter, Some(1.0))];
        assert_eq!(tracker.observe(&no_prey, now), TickOutcome::Skipped);

        let prey_unlocated = [
            located("prey", ParticipantRole::Prey, None),
            located("h1", ParticipantRole::Hunter, Some(1.0)),
        ];
        assert_eq!(tracker.observe(&prey_unlocated, now), TickOutcome::Skipped);
        assert_eq!(tracker.min_distance(), None);
    }

    #[test]
    fn first_sustained_hunter_in_id_order_wins() {
        let mut tracker = ProximityTracker::new(settings());
        let t0 = Instant::now();
        let snapshot = [
            located("prey", ParticipantRole::Prey, Some(0.0)),
            located("zed", ParticipantRole::Hunter, Some(1.0)),
            located("amy", ParticipantRole::Hunter, Some(2.0)),
            located("far", ParticipantRole::Hunter, Some(50.0)),
        ];
        tracker.observe(&snapshot, t0);
        let outcome = tracker.observe(&snapshot, t0 + Duration::from_secs(2));
        assert!(matches!(
            outcome,
            TickOutcome::Capture { ref hunter_id, .. } if hunter_id == "amy"
        ));

        let far = tracker.distance_of("far").unwrap();
        assert!((far - 50.0).abs() < 0.5, "distance {far}");
        assert!(tracker.min_distance().unwrap() < 1.5);
    }

    #[test]
    fn latch_admits_one_capture() {
        let shared = CaptureShared::new(settings());
        assert!(shared.try_fire());
        assert!(!shared.try_fire());
        shared.reset_latch();
        assert!(shared.try_fire());
    }

    #[tokio::test]
    async fn engine_captures_prey_end_to_end() {
        let fx = fixture_with(&["p", "h"], fast_settings());
        let arena = ready_arena(&fx, "p", &["h"]).await;
        let mut events = fx.service.subscribe();
        fx.service.start_arena(arena.id, "host").await.unwrap();

        fx.service
            .report_location(arena.id, "p", origin())
            .await
            .unwrap();
        fx.service
            .report_location(arena.id, "h", north_of(origin(), 1.0))
            .await
            .unwrap();

        let ended = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let ArenaEvent::ArenaEnded { reason, winner_team, .. } =
                    events.recv().await.unwrap()
                {
                    return (reason, winner_team);
                }
            }
        })
        .await
        .expect("capture should end the arena");
        assert_eq!(ended, (EndReason::Capture, Some(WinnerTeam::Hunters)));

        let arena = fx.service.get_arena(arena.id).await.unwrap();
        assert_eq!(arena.status, ArenaStatus::Ended);
        assert!(!fx.service.is_tracking(&arena.id));

        let prey = fx
            .service
            .get_participants(arena.id)
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.user_id == "p")
            .unwrap();
        assert_eq!(prey.status, ParticipantStatus::Captured);
        assert_eq!(prey.captured_by.as_deref(), Some("h"));

        // Exactly one end transition was published
        tokio::time::sleep(Duration::from_millis(100)).await;
        let ends = fx
            .service
            .recent_events(&arena.id)
            .iter()
            .filter(|e| matches!(e, ArenaEvent::ArenaEnded { .. }))
            .count();
        assert_eq!(ends, 1);
    }

    #[tokio::test]
    async fn distant_hunter_never_captures() {
        let fx = fixture_with(&["p", "h"], fast_settings());
        let arena = ready_arena(&fx, "p", &["h"]).await;
        fx.service.start_arena(arena.id, "host").await.unwrap();
        fx.service
            .report_location(arena.id, "p", origin())
            .await
            .unwrap();
        fx.service
            .report_location(arena.id, "h", north_of(origin(), 30.0))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(fx.service.get_arena(arena.id).await.unwrap().is_active());
        let distance = fx.service.hunter_distance(&arena.id, "h").unwrap();
        assert!((distance - 30.0).abs() < 0.5, "distance {distance}");
        assert_eq!(fx.service.min_hunter_distance(&arena.id), Some(distance));
        fx.service.shutdown();
    }

    #[tokio::test]
    async fn failed_capture_releases_latch_and_engine_exits() {
        // The arena's own engine polls too slowly to interfere
        let slow = ServiceSettings {
            capture: CaptureSettings {
                poll_interval: Duration::from_secs(3600),
                ..settings()
            },
            ..ServiceSettings::default()
        };
        let fx = fixture_with(&["p", "h"], slow);
        let arena = ready_arena(&fx, "p", &["h"]).await;
        fx.service.start_arena(arena.id, "host").await.unwrap();
        fx.service
            .report_location(arena.id, "p", origin())
            .await
            .unwrap();
        fx.service
            .report_location(arena.id, "h", north_of(origin(), 1.0))
            .await
            .unwrap();

        let shared = Arc::new(CaptureShared::new(CaptureSettings {
            hold: Duration::ZERO,
            ..settings()
        }));
        let snapshot = tracked_participants(&fx.service, &arena.id)
            .await
            .unwrap();
        let now = Instant::now();
        assert!(
            evaluate_tick(&fx.service, arena.id, &shared, &snapshot, now)
                .await
                .is_continue()
        );

        // The host ends the arena after the snapshot was taken
        fx.service
            .end_arena(arena.id, &Caller::user("host"), EndReason::HostEnded, None)
            .await
            .unwrap();

        let flow = evaluate_tick(&fx.service, arena.id, &shared, &snapshot, now).await;
        assert!(flow.is_continue());
        assert!(!shared.capture_fired.load(Ordering::Acquire));
        assert!(tracked_participants(&fx.service, &arena.id).await.is_none());

        let (_command_tx, command_rx) = mpsc::unbounded_channel();
        let handle = spawn_capture_engine(fx.service.clone(), arena.id, shared, command_rx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("engine should exit once the arena ended")
            .unwrap();

        let ended: Vec<_> = fx
            .service
            .recent_events(&arena.id)
            .into_iter()
            .filter_map(|e| match e {
                ArenaEvent::ArenaEnded { reason, .. } => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(ended, vec![EndReason::HostEnded]);

        let prey = fx
            .service
            .get_participants(arena.id)
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.user_id == "p")
            .unwrap();
        assert!(!prey.is_captured);
        assert_ne!(prey.status, ParticipantStatus::Captured);
    }
}
