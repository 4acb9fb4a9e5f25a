use prowl_core::arena::ArenaId;

/// The geolocation/BLE collaborator. Sampling happens on devices; the
/// engine only asks for it to begin when an arena goes live. Samples come
/// back through `ArenaService::report_location`.
pub trait LocationService: Send + Sync {
    /// Fire-and-forget: must not block or fail the caller.
    fn initialize_locations(&self, arena_id: ArenaId);
}

/// Default collaborator that only records the request in the log.
#[derive(Debug, Default)]
pub struct LoggingLocationService;

impl LocationService for LoggingLocationService {
    fn initialize_locations(&self, arena_id: ArenaId) {
        tracing::info!(arena = %arena_id, "Location sampling requested");
    }
}
