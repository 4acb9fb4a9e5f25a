use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use prowl_core::arena::{Arena, ArenaId, EndReason, GameMode, WinnerTeam};
use prowl_core::error::ArenaError;
use prowl_core::events::ArenaEvent;
use prowl_core::participant::{ArenaParticipant, GeoPoint, ParticipantRole};
use prowl_core::room::{Room, RoomId, RoomMembership, UserId};

use crate::auth::CallerId;
use crate::error::{ApiJson, ApiPath, AppError};
use crate::service::Caller;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, AppError>;

#[derive(Debug, Deserialize)]
pub struct CreateRoomBody {
    pub name: String,
    #[serde(default)]
    pub capacity: Option<u32>,
}

/// POST /api/v1/rooms — create a room owned by the caller.
pub async fn create_room(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    ApiJson(body): ApiJson<CreateRoomBody>,
) -> Result<(StatusCode, Json<Room>), AppError> {
    let room = state.rooms.create_room(&body.name, &caller, body.capacity)?;
    tracing::info!(room = %room.id, owner = %caller, "Room created");
    Ok((StatusCode::CREATED, Json(room)))
}

#[derive(Debug, Serialize)]
pub struct RoomView {
    pub room: Room,
    pub members: Vec<RoomMembership>,
    pub arenas: Vec<Arena>,
}

/// GET /api/v1/rooms/{room_id}
pub async fn get_room(
    State(state): State<AppState>,
    ApiPath(room_id): ApiPath<RoomId>,
) -> ApiResult<RoomView> {
    let room = state
        .rooms
        .get_room(&room_id)
        .ok_or(ArenaError::RoomNotFound { room_id })?;
    Ok(Json(RoomView {
        members: state.rooms.members(&room_id),
        arenas: state.arenas.list_room_arenas(room_id).await,
        room,
    }))
}

#[derive(Debug, Deserialize)]
pub struct JoinRoomBody {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct JoinRoomResponse {
    pub room: Room,
    pub membership: RoomMembership,
}

/// POST /api/v1/rooms/join — join a room by its join code.
pub async fn join_room(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    ApiJson(body): ApiJson<JoinRoomBody>,
) -> ApiResult<JoinRoomResponse> {
    let (room, membership) = state.rooms.join_by_code(&body.code, &caller)?;
    Ok(Json(JoinRoomResponse { room, membership }))
}

/// POST /api/v1/rooms/{room_id}/leave — drop the caller's membership.
pub async fn leave_room(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    ApiPath(room_id): ApiPath<RoomId>,
) -> Result<StatusCode, AppError> {
    state.rooms.leave_room(&room_id, &caller)?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/rooms/{room_id} — owner only; removes the room's arenas
/// first and is refused while one of them is active.
pub async fn delete_room(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    ApiPath(room_id): ApiPath<RoomId>,
) -> Result<StatusCode, AppError> {
    state.rooms.require_owner(&room_id, &caller)?;
    state.arenas.remove_room_arenas(room_id).await?;
    state.rooms.delete_room(&room_id, &caller)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreateArenaBody {
    pub room_id: RoomId,
    #[serde(default)]
    pub mode: GameMode,
    pub duration_minutes: u32,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

/// POST /api/v1/arenas — create an arena hosted by the caller.
pub async fn create_arena(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    ApiJson(body): ApiJson<CreateArenaBody>,
) -> Result<(StatusCode, Json<Arena>), AppError> {
    let arena = state
        .arenas
        .create_arena_with_settings(
            body.room_id,
            &caller,
            body.mode,
            body.duration_minutes,
            body.settings,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(arena)))
}

/// GET /api/v1/arenas/{arena_id}
pub async fn get_arena(
    State(state): State<AppState>,
    ApiPath(arena_id): ApiPath<ArenaId>,
) -> ApiResult<Arena> {
    Ok(Json(state.arenas.get_arena(arena_id).await?))
}

/// POST /api/v1/arenas/{arena_id}/start
pub async fn start_arena(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    ApiPath(arena_id): ApiPath<ArenaId>,
) -> ApiResult<Arena> {
    Ok(Json(state.arenas.start_arena(arena_id, &caller).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct EndArenaBody {
    #[serde(default)]
    pub reason: Option<EndReason>,
    #[serde(default)]
    pub winner_team: Option<WinnerTeam>,
}

/// POST /api/v1/arenas/{arena_id}/end — host ends the arena.
/// The reason defaults to `host_ended`.
pub async fn end_arena(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    ApiPath(arena_id): ApiPath<ArenaId>,
    ApiJson(body): ApiJson<EndArenaBody>,
) -> ApiResult<Arena> {
    let reason = body.reason.unwrap_or(EndReason::HostEnded);
    let arena = state
        .arenas
        .end_arena(arena_id, &Caller::User(caller), reason, body.winner_team)
        .await?;
    Ok(Json(arena))
}

/// POST /api/v1/arenas/{arena_id}/cancel
pub async fn cancel_arena(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    ApiPath(arena_id): ApiPath<ArenaId>,
) -> ApiResult<Arena> {
    Ok(Json(state.arenas.cancel_arena(arena_id, &caller).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinArenaBody {
    #[serde(default)]
    pub role: Option<ParticipantRole>,
}

/// POST /api/v1/arenas/{arena_id}/join
pub async fn join_arena(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    ApiPath(arena_id): ApiPath<ArenaId>,
    ApiJson(body): ApiJson<JoinArenaBody>,
) -> ApiResult<ArenaParticipant> {
    Ok(Json(
        state.arenas.join_arena(arena_id, &caller, body.role).await?,
    ))
}

/// POST /api/v1/arenas/{arena_id}/leave
pub async fn leave_arena(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    ApiPath(arena_id): ApiPath<ArenaId>,
) -> ApiResult<ArenaParticipant> {
    Ok(Json(state.arenas.leave_arena(arena_id, &caller).await?))
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleBody {
    pub role: ParticipantRole,
}

/// PUT /api/v1/arenas/{arena_id}/participants/{user_id}/role — host only.
pub async fn assign_role(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    ApiPath((arena_id, target)): ApiPath<(ArenaId, UserId)>,
    ApiJson(body): ApiJson<AssignRoleBody>,
) -> ApiResult<ArenaParticipant> {
    let participant = state
        .arenas
        .assign_role(arena_id, &caller, &target, body.role)
        .await?;
    Ok(Json(participant))
}

/// GET /api/v1/arenas/{arena_id}/participants
pub async fn get_participants(
    State(state): State<AppState>,
    ApiPath(arena_id): ApiPath<ArenaId>,
) -> ApiResult<Vec<ArenaParticipant>> {
    Ok(Json(state.arenas.get_participants(arena_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct LocationBody {
    pub latitude: f64,
    pub longitude: f64,
}

/// POST /api/v1/arenas/{arena_id}/location — the caller's sampled position.
pub async fn report_location(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    ApiPath(arena_id): ApiPath<ArenaId>,
    ApiJson(body): ApiJson<LocationBody>,
) -> ApiResult<ArenaParticipant> {
    let point = GeoPoint {
        latitude: body.latitude,
        longitude: body.longitude,
    };
    Ok(Json(
        state.arenas.report_location(arena_id, &caller, point).await?,
    ))
}

#[derive(Debug, Serialize)]
pub struct HunterDistance {
    pub user_id: UserId,
    /// Meters to the prey; `None` until the engine has measured it.
    pub distance_m: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ProximityView {
    pub arena_id: ArenaId,
    pub tracking: bool,
    pub min_distance_m: Option<f64>,
    pub hunters: Vec<HunterDistance>,
}

/// GET /api/v1/arenas/{arena_id}/proximity — last measured hunter distances.
pub async fn get_proximity(
    State(state): State<AppState>,
    ApiPath(arena_id): ApiPath<ArenaId>,
) -> ApiResult<ProximityView> {
    let participants = state.arenas.get_participants(arena_id).await?;
    let hunters = participants
        .iter()
        .filter(|p| p.is_joined() && p.is_hunter())
        .map(|p| HunterDistance {
            user_id: p.user_id.clone(),
            distance_m: state.arenas.hunter_distance(&arena_id, &p.user_id),
        })
        .collect();
    Ok(Json(ProximityView {
        arena_id,
        tracking: state.arenas.is_tracking(&arena_id),
        min_distance_m: state.arenas.min_hunter_distance(&arena_id),
        hunters,
    }))
}

/// GET /api/v1/arenas/{arena_id}/events — recent lifecycle events, oldest first.
pub async fn get_arena_events(
    State(state): State<AppState>,
    ApiPath(arena_id): ApiPath<ArenaId>,
) -> ApiResult<Vec<ArenaEvent>> {
    state.arenas.get_arena(arena_id).await?;
    Ok(Json(state.arenas.recent_events(&arena_id)))
}

#[derive(Debug, Serialize)]
pub struct ActiveArenaResponse {
    pub arena: Option<Arena>,
}

/// GET /api/v1/users/{user_id}/active-arena
pub async fn get_user_active_arena(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> ApiResult<ActiveArenaResponse> {
    Ok(Json(ActiveArenaResponse {
        arena: state.arenas.get_user_active_arena(&user_id).await,
    }))
}
