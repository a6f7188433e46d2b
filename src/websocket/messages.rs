//! WebSocket Message Types
//!
//! Defines the wire payloads exchanged with chat clients and the
//! transport-neutral [`Frame`] the pumps operate on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::store::Message;

/// Pre-serialized outbound payload, shared between all recipients of one
/// broadcast
pub type Outbound = Arc<str>;

/// Payload sent from client to server
///
/// Unknown fields are ignored; a missing `content` is a decode failure.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    /// Message body text
    pub content: String,
}

impl InboundFrame {
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        serde_json::from_str(text).map_err(FrameError::Malformed)
    }
}

/// Payload sent from server to client for every chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFrame {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    /// Sender display name
    pub sender: String,
    pub content: String,
    /// ISO-8601 (RFC 3339) UTC timestamp
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for OutboundFrame {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            room_id: message.room_id.clone(),
            sender_id: message.sender.id.clone(),
            sender: message.sender.display_name.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp,
        }
    }
}

impl OutboundFrame {
    /// Serialize once for fan-out
    pub fn encode(&self) -> Result<Outbound, FrameError> {
        serde_json::to_string(self)
            .map(Outbound::from)
            .map_err(FrameError::Malformed)
    }
}

/// A transport frame, independent of the WebSocket library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Frame decoding failures
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Invalid message format: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Binary messages not supported")]
    Binary,

    #[error("Frame of {size} bytes exceeds limit of {limit}")]
    TooLarge { size: usize, limit: usize },
}
