//! Deadline watcher: ends an active arena with `timeout` once
//! `started_at + duration_minutes` has passed.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use prowl_core::arena::{ArenaId, EndReason, WinnerTeam};
use prowl_core::error::{ArenaError, ArenaResult};
use prowl_core::time::{Timestamp, timestamp_now};

use crate::config::DeadlineConfig;
use crate::service::{ArenaService, Caller};
use crate::supervisor::TaskCommand;

#[derive(Debug, Clone, Copy)]
pub struct DeadlineSettings {
    /// Upper bound on how long the watcher sleeps between checks.
    pub check_interval: Duration,
}

impl Default for DeadlineSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(1),
        }
    }
}

impl From<&DeadlineConfig> for DeadlineSettings {
    fn from(config: &DeadlineConfig) -> Self {
        Self {
            check_interval: Duration::from_millis(config.check_interval_ms),
        }
    }
}

impl ArenaService {
    /// End the arena with `timeout` if it is active and `now` is at or past
    /// its deadline. Returns whether this call performed the transition.
    ///
    /// Losing a race against another end path is not an error.
    pub async fn expire_if_due(&self, arena_id: ArenaId, now: Timestamp) -> ArenaResult<bool> {
        let due = {
            let repo = self.repo.read().await;
            let arena = repo.require_arena(&arena_id)?;
            arena.is_active() && arena.deadline().is_some_and(|d| now >= d)
        };
        if !due {
            return Ok(false);
        }

        match self
            .end_arena(arena_id, &Caller::System, EndReason::Timeout, Some(WinnerTeam::Prey))
            .await
        {
            Ok(_) => Ok(true),
            Err(ArenaError::InvalidStateTransition { .. }) => {
                tracing::debug!(arena = %arena_id, "Arena already ended before deadline");
                Ok(false)
            },
            Err(e) => Err(e),
        }
    }
}

/// Spawn the deadline watcher for an arena as a tokio task.
pub fn spawn_deadline_watcher(
    service: ArenaService,
    arena_id: ArenaId,
    deadline: Timestamp,
    command_rx: mpsc::UnboundedReceiver<TaskCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_deadline_watcher(service, arena_id, deadline, command_rx).await;
    })
}

async fn run_deadline_watcher(
    service: ArenaService,
    arena_id: ArenaId,
    deadline: Timestamp,
    mut command_rx: mpsc::UnboundedReceiver<TaskCommand>,
) {
    let check_interval = service.settings.deadline.check_interval;
    tracing::debug!(arena = %arena_id, deadline, "Deadline watcher running");

    loop {
        let now = timestamp_now();
        if now >= deadline {
            match service.expire_if_due(arena_id, now).await {
                Ok(true) => tracing::info!(arena = %arena_id, "Arena timed out"),
                Ok(false) => {},
                Err(e) => {
                    tracing::warn!(arena = %arena_id, error = %e, "Deadline transition failed");
                },
            }
            break;
        }

        let remaining = Duration::from_millis(deadline - now);
        tokio::select! {
            _ = tokio::time::sleep(remaining.min(check_interval)) => {
                let active = service
                    .repo
                    .read()
                    .await
                    .get_arena(&arena_id)
                    .is_some_and(|a| a.is_active());
                if !active {
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

    tracing::debug!(arena = %arena_id, "Deadline watcher stopped");
}
