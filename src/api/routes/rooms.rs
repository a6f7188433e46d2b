//! Room Routes
//!
//! - GET /api/v1/rooms - Rooms visible to the caller
//! - POST /api/v1/rooms - Create a room
//! - POST /api/v1/rooms/:id/members - Add a member (owner only)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::dto::{AddMemberRequest, CreateRoomRequest, MemberResponse, RoomDto, RoomsResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{blocking, AuthUser};
use crate::api::state::AppState;
use crate::store::{Room, RoomStore};

/// GET /api/v1/rooms
pub async fn list_rooms(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> ApiResult<Json<RoomsResponse>> {
    let store = Arc::clone(&state.store);
    let rooms = blocking(move || Ok(store.list_rooms_for_user(&identity.id)?)).await?;

    Ok(Json(RoomsResponse {
        rooms: rooms.into_iter().map(RoomDto::from).collect(),
    }))
}

/// POST /api/v1/rooms
///
/// The creator owns the room and is its first member.
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Json(req): Json<CreateRoomRequest>,
) -> ApiResult<(StatusCode, Json<RoomDto>)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("Room name is required".to_string()));
    }

    let room = Room::new(name, &identity.id, req.room_type.unwrap_or_default());
    let store = Arc::clone(&state.store);
    let room = blocking(move || {
        store.create_room(&room)?;
        Ok(room)
    })
    .await?;

    tracing::info!(
        room_id = %room.id,
        user_id = %identity.id,
        room_type = %room.room_type,
        "Room created"
    );

    Ok((StatusCode::CREATED, Json(RoomDto::from(room))))
}

/// POST /api/v1/rooms/:id/members
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(room_id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<Json<MemberResponse>> {
    let user_id = req.user_id.trim().to_string();
    if user_id.is_empty() {
        return Err(ApiError::Validation("userId is required".to_string()));
    }

    let store = Arc::clone(&state.store);
    let caller = identity.id.clone();
    let response = blocking(move || {
        let room = store
            .get_room(&room_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Room '{}'", room_id)))?;
        if room.owner_id != caller {
            return Err(ApiError::Forbidden(
                "Only the room owner can add members".to_string(),
            ));
        }
        store.add_member(&room.id, &user_id)?;
        Ok(MemberResponse {
            room_id: room.id,
            user_id,
            status: "member".to_string(),
        })
    })
    .await?;

    tracing::info!(
        room_id = %response.room_id,
        user_id = %response.user_id,
        added_by = %identity.id,
        "Member added"
    );

    Ok(Json(response))
}
