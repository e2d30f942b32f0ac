use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;

use crate::api::ApiResponse;
use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::models::{
    CreateMeetingRequest, JoinPolicy, NewRoom, RecentMeetingsQuery, Room, RoomSummary,
    UpdateMeetingRequest,
};
use crate::state::AppState;

/// Meeting routes
pub fn meeting_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_meeting))
        .route("/instant", post(create_instant_meeting))
        .route("/recent", get(recent_meetings))
        .route("/validate/{room_id}", get(validate_meeting))
        .route(
            "/{room_id}",
            get(get_meeting).put(update_meeting).delete(delete_meeting),
        )
}

/// POST /api/meetings - Schedule a meeting
async fn create_meeting(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(request), _): WithRejection<Json<CreateMeetingRequest>, AppError>,
) -> Result<ApiResponse<Room>> {
    let enforce = request
        .enforce_window
        .unwrap_or(state.config.enforce_schedule_window);

    let room = state
        .registry
        .create(NewRoom {
            title: request.title,
            window_from: request.meeting_from,
            window_to: request.meeting_to,
            host_id: user.user_id,
            participant_ids: request.participant_ids,
            join_policy: JoinPolicy::enforced(enforce),
        })
        .await?;

    Ok(ApiResponse::created(room).with_message("Meeting created successfully"))
}

/// POST /api/meetings/instant - Create a meeting that starts now
async fn create_instant_meeting(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<ApiResponse<Room>> {
    let room = state.registry.create_instant(&user.user_id).await?;
    Ok(ApiResponse::created(room).with_message("Instant meeting created"))
}

/// GET /api/meetings/recent?type=past|upcoming
async fn recent_meetings(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Query(query), _): WithRejection<Query<RecentMeetingsQuery>, AppError>,
) -> Result<ApiResponse<Vec<Room>>> {
    let rooms = state
        .registry
        .list_for_user(&user.user_id, query.category)
        .await?;
    Ok(ApiResponse::ok(rooms))
}

/// GET /api/meetings/validate/{room_id} - Public existence check
async fn validate_meeting(
    State(state): State<AppState>,
    WithRejection(Path(room_id), _): WithRejection<Path<String>, AppError>,
) -> Result<ApiResponse<RoomSummary>> {
    let room = state.registry.resolve(&room_id).await?;
    Ok(ApiResponse::ok(RoomSummary::from(&room)))
}

/// GET /api/meetings/{room_id} - Full record, participants only
async fn get_meeting(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(room_id), _): WithRejection<Path<String>, AppError>,
) -> Result<ApiResponse<Room>> {
    let room = state.registry.resolve(&room_id).await?;
    if !room.is_participant(&user.user_id) {
        return Err(AppError::Forbidden(
            "You are not a participant of this meeting".to_string(),
        ));
    }
    Ok(ApiResponse::ok(room))
}

async fn require_host(state: &AppState, room_id: &str, user_id: &str) -> Result<Room> {
    let room = state.registry.resolve(room_id).await?;
    if !room.is_host(user_id) {
        tracing::debug!(room_id = %room.room_id, user_id = %user_id, "Non-host mutation rejected");
        return Err(AppError::Forbidden(
            "Only the host can modify this meeting".to_string(),
        ));
    }
    Ok(room)
}

/// PUT /api/meetings/{room_id} - Host only
async fn update_meeting(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(room_id), _): WithRejection<Path<String>, AppError>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateMeetingRequest>, AppError>,
) -> Result<ApiResponse<Room>> {
    let room = require_host(&state, &room_id, &user.user_id).await?;
    let updated = state.registry.update(&room.room_id, request.into()).await?;
    Ok(ApiResponse::ok(updated).with_message("Meeting updated successfully"))
}

/// DELETE /api/meetings/{room_id} - Host only
async fn delete_meeting(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(room_id), _): WithRejection<Path<String>, AppError>,
) -> Result<ApiResponse<()>> {
    let room = require_host(&state, &room_id, &user.user_id).await?;
    state.registry.delete(&room.room_id).await?;
    state.presence.clear_room(&room.room_id);
    Ok(ApiResponse::ok(()).with_message("Meeting deleted successfully"))
}
