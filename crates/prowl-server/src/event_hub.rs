use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use prowl_core::arena::ArenaId;
use prowl_core::events::ArenaEvent;
use tokio::sync::broadcast;

/// Default number of recent events kept for replay.
const DEFAULT_MAX_STORED_EVENTS: usize = 500;

/// Default broadcast channel capacity for event fan-out.
const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// Best-effort push channel for arena lifecycle events, with a bounded
/// history so late subscribers can catch up on one arena.
///
/// State-changing operations publish while they still hold the repository
/// write guard, so per-arena event order matches the order of the writes.
/// Delivery itself is lossy: a lagging subscriber skips events.
pub struct EventHub {
    recent: Mutex<VecDeque<ArenaEvent>>,
    broadcast_tx: broadcast::Sender<ArenaEvent>,
    max_stored_events: usize,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_STORED_EVENTS, DEFAULT_BROADCAST_CAPACITY)
    }

    pub fn with_capacity(max_stored_events: usize, broadcast_capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(broadcast_capacity);
        Self {
            recent: Mutex::new(VecDeque::new()),
            broadcast_tx,
            max_stored_events,
        }
    }

    /// Record and broadcast an event. Never blocks; having no subscribers
    /// is not an error.
    pub fn publish(&self, event: ArenaEvent) {
        tracing::debug!(arena = %event.arena_id(), event = event.name(), "Publishing arena event");
        let _ = self.broadcast_tx.send(event.clone());
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        recent.push_back(event);
        while recent.len() > self.max_stored_events {
            recent.pop_front();
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ArenaEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Stored events for one arena, oldest first.
    pub fn recent_for(&self, arena_id: &ArenaId) -> Vec<ArenaEvent> {
        let recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        recent
            .iter()
            .filter(|e| e.arena_id() == *arena_id)
            .cloned()
            .collect()
    }
}
