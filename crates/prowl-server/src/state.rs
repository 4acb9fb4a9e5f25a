use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::auth::AuthConfig;
use crate::config::ServerConfig;
use crate::location::{LocationService, LoggingLocationService};
use crate::rooms::{InMemoryRoomStore, RoomDirectory};
use crate::service::{ArenaService, ServiceSettings};

#[derive(Clone)]
pub struct AppState {
    pub arenas: ArenaService,
    pub rooms: Arc<InMemoryRoomStore>,
    pub auth: AuthConfig,
    pub config: Arc<ServerConfig>,
    pub sse_subscriber_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_locations(config, Arc::new(LoggingLocationService))
    }

    /// Build state around a specific location collaborator.
    pub fn with_locations(config: ServerConfig, locations: Arc<dyn LocationService>) -> Self {
        let auth = AuthConfig {
            bearer_token: config.auth.bearer_token.clone(),
        };
        let rooms = Arc::new(InMemoryRoomStore::new());
        let arenas = ArenaService::new(
            Arc::clone(&rooms) as Arc<dyn RoomDirectory>,
            locations,
            ServiceSettings::from_config(&config),
        );
        Self {
            arenas,
            rooms,
            auth,
            config: Arc::new(config),
            sse_subscriber_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Counts a live connection for as long as it is held.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
