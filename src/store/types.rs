//! Core data types for the Huddle store
//!
//! This module defines the records that flow between the hub, the REST API
//! and the database:
//! - `Identity`: A resolved, immutable user identity
//! - `User`: An account with its password hash
//! - `Room` and `RoomType`: Chat rooms and their visibility
//! - `Message`: A single chat message

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A resolved user identity
///
/// Produced by an identity resolver and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Stable user id
    pub id: String,
    /// Name shown next to messages
    pub display_name: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A registered account
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    /// PHC-formatted password hash
    pub password_hash: String,
}

impl User {
    /// Create a new user with a freshly generated id
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username: username.into(),
            password_hash: password_hash.into(),
        }
    }

    /// The identity this account authenticates as
    pub fn identity(&self) -> Identity {
        Identity::new(&self.id, &self.username)
    }
}

/// Room visibility
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    /// Listed for every user
    Public,
    /// Listed only for members
    #[default]
    Private,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Public => "public",
            RoomType::Private => "private",
        }
    }
}

impl std::fmt::Display for RoomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RoomType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(RoomType::Public),
            "private" => Ok(RoomType::Private),
            _ => Err(format!("Unknown room type: {}", s)),
        }
    }
}

/// A chat room
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub room_type: RoomType,
}

impl Room {
    /// Create a new room with a freshly generated id
    pub fn new(name: impl Into<String>, owner_id: impl Into<String>, room_type: RoomType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            owner_id: owner_id.into(),
            room_type,
        }
    }
}

/// A chat message
///
/// Immutable once created. The timestamp is truncated to millisecond
/// precision so that it survives a round trip through the store unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub sender: Identity,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message received now
    pub fn new(room_id: impl Into<String>, sender: Identity, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.into(),
            sender,
            content: content.into(),
            timestamp: Utc::now().trunc_subsecs(3),
        }
    }

    /// Builder method: set timestamp
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(3);
        self
    }
}
