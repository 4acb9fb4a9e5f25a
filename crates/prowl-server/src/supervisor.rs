use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use prowl_core::arena::ArenaId;

use crate::capture::CaptureShared;

/// Commands sent from the state machine to a per-arena background task.
#[derive(Debug)]
pub enum TaskCommand {
    Stop,
}

/// Handle to one spawned background task.
pub struct TaskHandle {
    pub name: &'static str,
    pub command_tx: mpsc::UnboundedSender<TaskCommand>,
    pub join: JoinHandle<()>,
}

/// Background work running for one active arena.
#[derive(Default)]
pub struct ArenaTasks {
    pub tasks: Vec<TaskHandle>,
    /// Tracker shared with the capture engine, read by distance queries.
    pub capture: Option<Arc<CaptureShared>>,
}

/// Table of per-arena background tasks owned by the state machine.
#[derive(Default)]
pub struct TaskSupervisor {
    arenas: HashMap<ArenaId, ArenaTasks>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the tasks for an arena, stopping any previous set first.
    pub fn register(&mut self, arena_id: ArenaId, tasks: ArenaTasks) {
        if self.stop(&arena_id) {
            tracing::debug!(arena = %arena_id, "Replaced running arena tasks");
        }
        self.arenas.insert(arena_id, tasks);
    }

    /// Signal every task of an arena to stop and forget them. Idempotent;
    /// safe to call from inside one of the stopped tasks because nothing
    /// here waits on or aborts them. Returns whether anything was running.
    pub fn stop(&mut self, arena_id: &ArenaId) -> bool {
        let Some(entry) = self.arenas.remove(arena_id) else {
            return false;
        };
        for task in entry.tasks {
            if let Err(e) = task.command_tx.send(TaskCommand::Stop) {
                tracing::debug!(arena = %arena_id, task = task.name, error = %e, "Task already stopped");
            }
        }
        true
    }

    pub fn is_running(&self, arena_id: &ArenaId) -> bool {
        self.arenas.contains_key(arena_id)
    }

    pub fn capture_state(&self, arena_id: &ArenaId) -> Option<Arc<CaptureShared>> {
        self.arenas
            .get(arena_id)
            .and_then(|entry| entry.capture.as_ref().map(Arc::clone))
    }

    pub fn running_count(&self) -> usize {
        self.arenas.len()
    }

    /// Abort every task. Used on server shutdown.
    pub fn shutdown(&mut self) {
        for (arena_id, entry) in self.arenas.drain() {
            for task in entry.tasks {
                task.join.abort();
                tracing::debug!(arena = %arena_id, task = task.name, "Aborted arena task");
            }
        }
    }
}
