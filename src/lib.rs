//! # Huddle
//!
//! Real-time chat hub: room-scoped message fan-out over WebSockets, backed
//! by a durable message history.
//!
//! ## Features
//!
//! - **Single-writer hub**: One task serializes register, unregister and
//!   broadcast, so every broadcast sees a consistent view of the room
//! - **Persist, then deliver**: A message is stored before any recipient
//!   sees it; a store failure delivers nothing
//! - **Bounded queues**: Slow clients are dropped instead of slowing the room
//! - **Backfill**: Reconnecting clients fetch what they missed over REST
//!
//! ## Modules
//!
//! - [`websocket`]: Hub, connection lifecycle and pumps
//! - [`store`]: SQLite-backed users, rooms and messages
//! - [`auth`]: JWT identity resolution and password hashing
//! - [`api`]: REST API server with Axum
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use huddle::auth::JwtAuthority;
//! use huddle::config::Config;
//! use huddle::store::SqliteStore;
//! use huddle::websocket::Hub;
//! use huddle::{serve, AppState};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let store = Arc::new(SqliteStore::open_in_memory()?);
//!     let authority = Arc::new(JwtAuthority::new(b"dev-secret", "huddle", 24));
//!
//!     let (hub, hub_task) = Hub::spawn(config.hub.clone(), store.clone());
//!     let state = AppState::new(store, authority, hub.clone(), config.connection.clone());
//!
//!     serve(state, &config.server).await?;
//!
//!     hub.shutdown().await;
//!     hub_task.await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod logging;
pub mod store;
pub mod websocket;

// Re-export top-level types for convenience
pub use api::{build_router, serve, ApiError, AppState};
pub use config::{Config, ConfigError};
pub use store::{Identity, Message, SqliteStore, StoreError};
pub use websocket::{Hub, HubConfig, HubHandle};
