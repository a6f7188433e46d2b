//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Room, RoomType, User};
use crate::websocket::OutboundFrame;

// ============================================
// USER DTOs
// ============================================

/// Register and login request body
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Public view of an account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserDto {
    pub id: String,
    pub username: String,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
        }
    }
}

/// Successful login
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserDto,
}

// ============================================
// ROOM DTOs
// ============================================

/// Room creation request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub name: String,
    /// Defaults to private
    #[serde(default)]
    pub room_type: Option<RoomType>,
}

/// Room as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomDto {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub room_type: RoomType,
}

impl From<Room> for RoomDto {
    fn from(room: Room) -> Self {
        Self {
            id: room.id,
            name: room.name,
            owner_id: room.owner_id,
            room_type: room.room_type,
        }
    }
}

/// Room listing
#[derive(Debug, Serialize, Deserialize)]
pub struct RoomsResponse {
    pub rooms: Vec<RoomDto>,
}

/// Add-member request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    #[serde(default)]
    pub user_id: String,
}

/// Add-member response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    pub room_id: String,
    pub user_id: String,
    pub status: String,
}

// ============================================
// MESSAGE DTOs
// ============================================

/// Default page size for history requests
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Largest page a client may request
pub const MAX_HISTORY_LIMIT: usize = 500;

/// History query parameters
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Return messages strictly after this instant
    pub since: Option<DateTime<Utc>>,
    /// Page size when `since` is absent
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// Requested limit, clamped to `1..=MAX_HISTORY_LIMIT`
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

/// Message history, in the same shape as live frames
#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<OutboundFrame>,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy"
    pub status: String,
    /// Store status
    pub store: String,
    /// Hub status
    pub hub: String,
    /// Live WebSocket connections
    pub connections: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Server version
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_limit_clamped() {
        assert_eq!(HistoryQuery::default().effective_limit(), 50);
        let q = HistoryQuery {
            since: None,
            limit: Some(10_000),
        };
        assert_eq!(q.effective_limit(), 500);
        let q = HistoryQuery {
            since: None,
            limit: Some(0),
        };
        assert_eq!(q.effective_limit(), 1);
    }

    #[test]
    fn test_create_room_request_defaults() {
        let req: CreateRoomRequest = serde_json::from_str(r#"{"name": "general"}"#).unwrap();
        assert_eq!(req.room_type, None);

        let req: CreateRoomRequest =
            serde_json::from_str(r#"{"name": "lobby", "roomType": "public"}"#).unwrap();
        assert_eq!(req.room_type, Some(RoomType::Public));
    }

    #[test]
    fn test_room_dto_field_names() {
        let room = Room::new("general", "u1", RoomType::Private);
        let json = serde_json::to_value(RoomDto::from(room)).unwrap();
        assert_eq!(json["ownerId"], "u1");
        assert_eq!(json["roomType"], "private");
    }
}
