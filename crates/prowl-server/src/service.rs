use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, mpsc};

use prowl_core::arena::{Arena, ArenaId};
use prowl_core::events::ArenaEvent;
use prowl_core::room::UserId;

use crate::capture::{CaptureSettings, CaptureShared, spawn_capture_engine};
use crate::config::ServerConfig;
use crate::deadline::{DeadlineSettings, spawn_deadline_watcher};
use crate::event_hub::EventHub;
use crate::location::LocationService;
use crate::repository::{ArenaCounts, ArenaRepository, SharedRepository};
use crate::rooms::RoomDirectory;
use crate::supervisor::{ArenaTasks, TaskHandle, TaskSupervisor};

/// Who is asking for an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// A resolved end user.
    User(UserId),
    /// The server itself: capture engine, deadline watcher, all-left cascade.
    System,
}

impl Caller {
    pub fn user(id: impl Into<UserId>) -> Self {
        Self::User(id.into())
    }

    /// Identifier used in logs and authorization errors.
    pub fn label(&self) -> &str {
        match self {
            Self::User(id) => id.as_str(),
            Self::System => "system",
        }
    }
}

/// Tunables for the engine's background work and event fan-out.
#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub capture: CaptureSettings,
    pub deadline: DeadlineSettings,
    pub events: EventSettings,
}

#[derive(Debug, Clone)]
pub struct EventSettings {
    pub max_stored_events: usize,
    pub broadcast_capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            max_stored_events: 500,
            broadcast_capacity: 1024,
        }
    }
}

impl ServiceSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            capture: CaptureSettings::from(&config.capture),
            deadline: DeadlineSettings::from(&config.deadline),
            events: EventSettings {
                max_stored_events: config.limits.max_stored_events,
                broadcast_capacity: config.limits.broadcast_capacity,
            },
        }
    }
}

/// The arena engine: state machine, participant lifecycle and the
/// per-arena background tasks, over one shared repository.
///
/// Cloning is cheap; every clone drives the same arenas.
#[derive(Clone)]
pub struct ArenaService {
    pub(crate) repo: SharedRepository,
    pub(crate) rooms: Arc<dyn RoomDirectory>,
    pub(crate) locations: Arc<dyn LocationService>,
    pub(crate) tasks: Arc<Mutex<TaskSupervisor>>,
    pub(crate) events: Arc<EventHub>,
    pub(crate) settings: Arc<ServiceSettings>,
}

impl ArenaService {
    pub fn new(
        rooms: Arc<dyn RoomDirectory>,
        locations: Arc<dyn LocationService>,
        settings: ServiceSettings,
    ) -> Self {
        let events = EventHub::with_capacity(
            settings.events.max_stored_events,
            settings.events.broadcast_capacity,
        );
        Self {
            repo: ArenaRepository::shared(),
            rooms,
            locations,
            tasks: Arc::new(Mutex::new(TaskSupervisor::new())),
            events: Arc::new(events),
            settings: Arc::new(settings),
        }
    }

    pub fn repository(&self) -> SharedRepository {
        Arc::clone(&self.repo)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ArenaEvent> {
        self.events.subscribe()
    }

    /// Recent events for one arena, oldest first.
    pub fn recent_events(&self, arena_id: &ArenaId) -> Vec<ArenaEvent> {
        self.events.recent_for(arena_id)
    }

    pub async fn counts(&self) -> ArenaCounts {
        self.repo.read().await.counts()
    }

    pub(crate) fn supervisor(&self) -> MutexGuard<'_, TaskSupervisor> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether background tasks are registered for the arena.
    pub fn is_tracking(&self, arena_id: &ArenaId) -> bool {
        self.supervisor().is_running(arena_id)
    }

    pub fn tracked_count(&self) -> usize {
        self.supervisor().running_count()
    }

    /// Spawn the capture engine (for proximity modes) and the deadline
    /// watcher for a freshly started arena.
    pub(crate) fn start_background_tasks(&self, arena: &Arena) {
        let mut tasks = ArenaTasks::default();

        if arena.mode.tracks_proximity() {
            let shared = Arc::new(CaptureShared::new(self.settings.capture));
            let (command_tx, command_rx) = mpsc::unbounded_channel();
            let join = spawn_capture_engine(self.clone(), arena.id, Arc::clone(&shared), command_rx);
            tasks.tasks.push(TaskHandle {
                name: "capture",
                command_tx,
                join,
            });
            tasks.capture = Some(shared);
        }

        if let Some(deadline) = arena.deadline() {
            let (command_tx, command_rx) = mpsc::unbounded_channel();
            let join = spawn_deadline_watcher(self.clone(), arena.id, deadline, command_rx);
            tasks.tasks.push(TaskHandle {
                name: "deadline",
                command_tx,
                join,
            });
        }

        self.supervisor().register(arena.id, tasks);
        tracing::debug!(arena = %arena.id, "Arena background tasks started");
    }

    /// Stop every background task of an arena. Idempotent.
    pub(crate) fn stop_background_tasks(&self, arena_id: &ArenaId) -> bool {
        self.supervisor().stop(arena_id)
    }

    /// Last computed distance from one hunter to the prey, in meters.
    /// `None` when the arena is not tracked or nothing was computed yet.
    pub fn hunter_distance(&self, arena_id: &ArenaId, hunter_id: &str) -> Option<f64> {
        let shared = self.supervisor().capture_state(arena_id)?;
        shared.hunter_distance(hunter_id)
    }

    /// Smallest last computed hunter-to-prey distance, in meters.
    pub fn min_hunter_distance(&self, arena_id: &ArenaId) -> Option<f64> {
        let shared = self.supervisor().capture_state(arena_id)?;
        shared.min_distance()
    }

    /// Abort all background tasks.
    pub fn shutdown(&self) {
        self.supervisor().shutdown();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::rooms::InMemoryRoomStore;
    use prowl_core::arena::GameMode;
    use prowl_core::participant::ParticipantRole;
    use prowl_core::room::RoomId;

    /// Location collaborator that records every initialization request.
    #[derive(Default)]
    pub struct RecordingLocations {
        pub calls: Mutex<Vec<ArenaId>>,
    }

    impl LocationService for RecordingLocations {
        fn initialize_locations(&self, arena_id: ArenaId) {
            self.calls.lock().unwrap().push(arena_id);
        }
    }

    pub struct Fixture {
        pub service: ArenaService,
        pub rooms: Arc<InMemoryRoomStore>,
        pub locations: Arc<RecordingLocations>,
        pub room_id: RoomId,
    }

    /// Settings with fast polling so capture tests finish quickly.
    pub fn fast_settings() -> ServiceSettings {
        ServiceSettings {
            capture: CaptureSettings {
                poll_interval: Duration::from_millis(10),
                capture_distance_m: 2.5,
                hold: Duration::from_millis(40),
            },
            deadline: DeadlineSettings {
                check_interval: Duration::from_millis(20),
            },
            events: EventSettings::default(),
        }
    }

    /// A room owned by "host" whose members are "host" plus `members`.
    pub fn fixture(members: &[&str]) -> Fixture {
        fixture_with(members, ServiceSettings::default())
    }

    pub fn fixture_with(members: &[&str], settings: ServiceSettings) -> Fixture {
        let rooms = Arc::new(InMemoryRoomStore::new());
        let room = rooms.create_room("Test room", "host", None).unwrap();
        for m in members {
            rooms.add_member(&room.id, m).unwrap();
        }
        let locations = Arc::new(RecordingLocations::default());
        let service = ArenaService::new(
            Arc::clone(&rooms) as Arc<dyn RoomDirectory>,
            Arc::clone(&locations) as Arc<dyn LocationService>,
            settings,
        );
        Fixture {
            service,
            rooms,
            locations,
            room_id: room.id,
        }
    }

    /// A ten minute lobby arena hosted by "host" with the given roles
    /// joined. An empty `prey` joins no prey.
    pub async fn ready_arena(fx: &Fixture, prey: &str, hunters: &[&str]) -> Arena {
        let arena = fx
            .service
            .create_arena(fx.room_id, "host", GameMode::Predators, 10)
            .await
            .unwrap();
        if !prey.is_empty() {
            fx.service
                .join_arena(arena.id, prey, Some(ParticipantRole::Prey))
                .await
                .unwrap();
        }
        for h in hunters {
            fx.service
                .join_arena(arena.id, h, Some(ParticipantRole::Hunter))
                .await
                .unwrap();
        }
        arena
    }
}
