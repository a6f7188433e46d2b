//! Message History Routes
//!
//! - GET /api/v1/rooms/:id/messages?since=<rfc3339>&limit=<n>
//!
//! Reconnecting clients pass the timestamp of the last message they saw to
//! backfill what they missed. Without `since` the most recent page is
//! returned. Either way messages are ascending by timestamp.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{HistoryQuery, MessagesResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{blocking, AuthUser};
use crate::api::state::AppState;
use crate::store::{MessageStore, RoomStore, RoomType};
use crate::websocket::OutboundFrame;

/// GET /api/v1/rooms/:id/messages
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<MessagesResponse>> {
    let store = Arc::clone(&state.store);

    let messages = blocking(move || {
        // Unknown room ids have no access control to enforce
        if let Some(room) = store.get_room(&room_id)? {
            let allowed = room.room_type == RoomType::Public
                || room.owner_id == identity.id
                || store.is_member(&room.id, &identity.id)?;
            if !allowed {
                return Err(ApiError::Forbidden(
                    "Not a member of this room".to_string(),
                ));
            }
        }

        let messages = match query.since {
            Some(since) => store.list_since(&room_id, since)?,
            None => store.list_recent(&room_id, query.effective_limit())?,
        };
        Ok(messages)
    })
    .await?;

    Ok(Json(MessagesResponse {
        messages: messages.iter().map(OutboundFrame::from).collect(),
    }))
}
