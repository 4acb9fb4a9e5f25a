pub mod api;
pub mod auth;
pub mod capture;
pub mod config;
pub mod deadline;
pub mod error;
pub mod event_hub;
pub mod health;
pub mod lifecycle;
pub mod location;
pub mod participants;
pub mod repository;
pub mod rooms;
pub mod service;
pub mod sse;
pub mod state;
pub mod supervisor;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::middleware;
use axum::routing::{get, post, put};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;

use config::ServerConfig;
use location::LocationService;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    router_for(AppState::new(config))
}

/// Like [`build_app`], with a specific location collaborator.
pub fn build_app_with(
    config: ServerConfig,
    locations: Arc<dyn LocationService>,
) -> (Router<()>, AppState) {
    router_for(AppState::with_locations(config, locations))
}

fn router_for(state: AppState) -> (Router<()>, AppState) {
    let request_timeout = Duration::from_secs(state.config.limits.request_timeout_secs);

    // Request/response routes get the timeout; the SSE stream is long-lived.
    let rest_routes = Router::new()
        .route("/rooms", post(api::create_room))
        .route("/rooms/join", post(api::join_room))
        .route("/rooms/{room_id}", get(api::get_room).delete(api::delete_room))
        .route("/rooms/{room_id}/leave", post(api::leave_room))
        .route("/arenas", post(api::create_arena))
        .route("/arenas/{arena_id}", get(api::get_arena))
        .route("/arenas/{arena_id}/start", post(api::start_arena))
        .route("/arenas/{arena_id}/end", post(api::end_arena))
        .route("/arenas/{arena_id}/cancel", post(api::cancel_arena))
        .route("/arenas/{arena_id}/join", post(api::join_arena))
        .route("/arenas/{arena_id}/leave", post(api::leave_arena))
        .route(
            "/arenas/{arena_id}/participants",
            get(api::get_participants),
        )
        .route(
            "/arenas/{arena_id}/participants/{user_id}/role",
            put(api::assign_role),
        )
        .route("/arenas/{arena_id}/location", post(api::report_location))
        .route("/arenas/{arena_id}/proximity", get(api::get_proximity))
        .route("/arenas/{arena_id}/events", get(api::get_arena_events))
        .route(
            "/users/{user_id}/active-arena",
            get(api::get_user_active_arena),
        )
        .layer(TimeoutLayer::new(request_timeout));

    let api_routes = rest_routes
        .route("/events/stream", get(sse::event_stream))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::bearer_auth_middleware,
        ));

    let app = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api_routes)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::custom(error::panic_response))
        .with_state(state.clone());

    (app, state)
}
