//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::auth::JwtAuthority;
use crate::store::SqliteStore;
use crate::websocket::{ConnectionConfig, HubHandle};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Accounts, rooms and message history
    pub store: Arc<SqliteStore>,
    /// Issues and validates bearer tokens
    pub authority: Arc<JwtAuthority>,
    /// Handle to the running connection hub
    pub hub: HubHandle,
    /// Limits and timers applied to new WebSocket connections
    pub connection: ConnectionConfig,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<SqliteStore>,
        authority: Arc<JwtAuthority>,
        hub: HubHandle,
        connection: ConnectionConfig,
    ) -> Self {
        Self {
            store,
            authority,
            hub,
            connection,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Live WebSocket connection count, `None` if the hub has stopped
    pub async fn connection_count(&self) -> Option<usize> {
        self.hub.stats().await.ok().map(|stats| stats.connections)
    }
}
