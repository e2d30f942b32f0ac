use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use axum_extra::extract::WithRejection;
use serde::Serialize;

use crate::api::ApiResponse;
use crate::auth::AuthUser;
use crate::coordinator::JoinTarget;
use crate::error::{AppError, Result};
use crate::models::{JoinDescriptor, Room, RoomParticipants};
use crate::registry::normalize_room_id;
use crate::state::AppState;

type RoomPath = WithRejection<Path<String>, AppError>;

/// Video engine credential routes
pub fn zego_routes() -> Router<AppState> {
    Router::new()
        .route("/token/instant", post(instant_token))
        .route("/token/{room_id}", get(room_token))
        .route("/config", get(engine_config))
        .route("/room/{room_id}/participants", get(room_participants))
        .route("/room/{room_id}/leave", post(leave_room))
}

#[derive(Debug, Serialize)]
pub struct InstantJoinResponse {
    pub meeting: Room,
    pub credential: JoinDescriptor,
}

/// GET /api/zego/token/{room_id} - Join credential for an existing room
async fn room_token(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(room_id), _): RoomPath,
) -> Result<ApiResponse<JoinDescriptor>> {
    let outcome = state
        .coordinator
        .join(&user.user_id, JoinTarget::Existing(room_id))
        .await?;
    Ok(ApiResponse::ok(outcome.descriptor))
}

/// POST /api/zego/token/instant - Create a room and join it in one step
async fn instant_token(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<ApiResponse<InstantJoinResponse>> {
    let outcome = state
        .coordinator
        .join(&user.user_id, JoinTarget::Instant)
        .await?;
    Ok(ApiResponse::created(InstantJoinResponse {
        meeting: outcome.room,
        credential: outcome.descriptor,
    }))
}

/// GET /api/zego/config - Room-less credential for engine initialisation
async fn engine_config(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<ApiResponse<JoinDescriptor>> {
    let descriptor = state.coordinator.engine_config(&user.user_id).await?;
    Ok(ApiResponse::ok(descriptor))
}

/// GET /api/zego/room/{room_id}/participants - Live presence, public
async fn room_participants(
    State(state): State<AppState>,
    WithRejection(Path(room_id), _): RoomPath,
) -> Result<ApiResponse<RoomParticipants>> {
    let room = state.registry.resolve(&room_id).await?;
    let participants = state.presence.participants(&room.room_id);

    Ok(ApiResponse::ok(RoomParticipants {
        room_id: room.room_id,
        count: participants.len(),
        participants,
    }))
}

/// POST /api/zego/room/{room_id}/leave
async fn leave_room(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(room_id), _): RoomPath,
) -> Result<ApiResponse<()>> {
    let room_id = normalize_room_id(&room_id);
    let removed = state.presence.remove(&room_id, &user.user_id);
    tracing::debug!(room_id = %room_id, user_id = %user.user_id, removed = removed, "Left room");
    Ok(ApiResponse::ok(()).with_message("Left room"))
}
