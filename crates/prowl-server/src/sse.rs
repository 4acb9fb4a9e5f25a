use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use prowl_core::arena::ArenaId;
use prowl_core::events::ArenaEvent;

use crate::error::ApiQuery;
use crate::state::{AppState, ConnectionGuard};

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Only forward events for this arena.
    pub arena_id: Option<ArenaId>,
}

/// GET /api/v1/events/stream — SSE endpoint for arena lifecycle events.
pub async fn event_stream(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    let max_sse = state.config.limits.max_sse_subscribers;
    let current = state.sse_subscriber_count.load(Ordering::Relaxed);
    if current >= max_sse {
        tracing::warn!(current, max = max_sse, "SSE subscriber limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let guard = ConnectionGuard::new(Arc::clone(&state.sse_subscriber_count));
    let rx = state.arenas.subscribe();
    let arena_filter = query.arena_id;

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let _guard = &guard;
        match result {
            Ok(event) if arena_filter.is_none_or(|id| event.arena_id() == id) => {
                Some(Ok(to_sse(&event)))
            },
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("SSE broadcast receive error: {e}");
                None
            },
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &ArenaEvent) -> SseEvent {
    let json = serde_json::to_string(event).unwrap_or_default();
    SseEvent::default().event(event.name()).data(json)
}
