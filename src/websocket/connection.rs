//! Connection lifecycle
//!
//! Tracks one client session from upgrade request to transport release:
//!
//! ```text
//! Connecting -> Authenticated -> Active -> Closing -> Closed
//!     |               |                       ^
//!     +---------------+-----------------------+
//! ```
//!
//! Any state may begin closing; everything else must move forward one step.

use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::hub::{ConnectionId, Registration};
use super::messages::Outbound;
use crate::auth::{AuthError, IdentityResolver};
use crate::store::Identity;

/// Per-connection limits and timers
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Largest accepted inbound frame, in bytes
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Idle read deadline; refreshed by every inbound frame
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Liveness probe interval; must be shorter than the read timeout
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Upper bound on a single outbound write
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
}

fn default_max_frame_bytes() -> usize {
    4096
}

fn default_read_timeout() -> u64 {
    60
}

fn default_ping_interval() -> u64 {
    54
}

fn default_write_timeout() -> u64 {
    10
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
            read_timeout_secs: default_read_timeout(),
            ping_interval_secs: default_ping_interval(),
            write_timeout_secs: default_write_timeout(),
        }
    }
}

impl ConnectionConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport accepted, identity not yet resolved
    Connecting,
    /// Identity resolved and room id validated
    Authenticated,
    /// Registered with the hub, pumps running
    Active,
    /// Pumps stopping, unregistering from the hub
    Closing,
    /// Transport released
    Closed,
}

impl ConnectionState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticated)
                | (Authenticated, Active)
                | (Connecting | Authenticated | Active, Closing)
                | (Closing, Closed)
        )
    }
}

/// Why a connection left the `Active` state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame
    ClientClosed,
    /// Inbound stream ended without a close frame
    PeerGone,
    /// Transport read failed
    ReadError,
    /// Read deadline lapsed
    IdleTimeout,
    /// Inbound frame exceeded the size limit
    FrameTooLarge,
    /// Transport write failed
    WriteError,
    /// A single write exceeded the write timeout
    WriteTimeout,
    /// The hub closed the outbound queue
    QueueClosed,
    /// The egress pump stopped first
    EgressStopped,
    /// The hub refused or stopped accepting requests
    HubUnavailable,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CloseReason::ClientClosed => "client closed",
            CloseReason::PeerGone => "peer gone",
            CloseReason::ReadError => "read error",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::FrameTooLarge => "frame too large",
            CloseReason::WriteError => "write error",
            CloseReason::WriteTimeout => "write timeout",
            CloseReason::QueueClosed => "queue closed",
            CloseReason::EgressStopped => "egress stopped",
            CloseReason::HubUnavailable => "hub unavailable",
        };
        f.write_str(s)
    }
}

/// Errors while establishing a connection
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Room ID is required")]
    MissingRoom,

    #[error("Unauthorized: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

/// One client session bound to a room
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    room_id: String,
    identity: Option<Identity>,
    state: ConnectionState,
    opened_at: Instant,
    close_reason: Option<CloseReason>,
}

impl Connection {
    /// A freshly accepted transport for `room_id`
    pub fn accept(room_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.into(),
            identity: None,
            state: ConnectionState::Connecting,
            opened_at: Instant::now(),
            close_reason: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Validate the room id and resolve the credential.
    ///
    /// The room is checked first so a missing room is reported even when
    /// the credential is also absent.
    pub fn authenticate(
        &mut self,
        resolver: &dyn IdentityResolver,
        credential: Option<&str>,
    ) -> Result<&Identity, ConnectError> {
        if self.room_id.trim().is_empty() {
            return Err(ConnectError::MissingRoom);
        }

        let credential = credential.ok_or(AuthError::MissingCredential)?;
        let identity = resolver.resolve(credential)?;

        self.advance(ConnectionState::Authenticated)?;
        Ok(self.identity.insert(identity))
    }

    /// Build the hub registration for this connection
    pub fn registration(&self, outbound: mpsc::Sender<Outbound>) -> Result<Registration, ConnectError> {
        let identity = self.identity.clone().ok_or(ConnectError::InvalidTransition {
            from: self.state,
            to: ConnectionState::Active,
        })?;

        Ok(Registration {
            id: self.id.clone(),
            identity,
            room_id: self.room_id.clone(),
            outbound,
        })
    }

    /// Mark the connection as registered and pumping
    pub fn activate(&mut self) -> Result<(), ConnectError> {
        self.advance(ConnectionState::Active)
    }

    /// Enter `Closing`. Only the first reason is kept.
    pub fn begin_close(&mut self, reason: CloseReason) {
        if self.state == ConnectionState::Closing || self.state == ConnectionState::Closed {
            return;
        }
        self.close_reason.get_or_insert(reason);
        if let Err(e) = self.advance(ConnectionState::Closing) {
            tracing::error!(connection_id = %self.id, error = %e, "Cannot begin close");
        }
    }

    /// Enter `Closed` once the transport is released
    pub fn finish_close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if self.state != ConnectionState::Closing {
            self.begin_close(CloseReason::PeerGone);
        }
        if let Err(e) = self.advance(ConnectionState::Closed) {
            tracing::error!(connection_id = %self.id, error = %e, "Cannot finish close");
            return;
        }

        tracing::info!(
            connection_id = %self.id,
            room_id = %self.room_id,
            reason = %self.close_reason.unwrap_or(CloseReason::PeerGone),
            duration_secs = self.opened_at.elapsed().as_secs(),
            "Connection closed"
        );
    }

    fn advance(&mut self, next: ConnectionState) -> Result<(), ConnectError> {
        if !self.state.can_transition_to(next) {
            return Err(ConnectError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::debug!(
            connection_id = %self.id,
            from = ?self.state,
            to = ?next,
            "Connection state change"
        );
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticResolver;

    impl IdentityResolver for StaticResolver {
        fn resolve(&self, credential: &str) -> Result<Identity, AuthError> {
            match credential {
                "good" => Ok(Identity::new("u1", "alice")),
                _ => Err(AuthError::InvalidToken("bad".to_string())),
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_frame_bytes, 4096);
        assert!(config.ping_interval() < config.read_timeout());
        assert_eq!(config.write_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_transition_table() {
        use ConnectionState::*;
        assert!(Connecting.can_transition_to(Authenticated));
        assert!(Authenticated.can_transition_to(Active));
        assert!(Active.can_transition_to(Closing));
        assert!(Connecting.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Closed));

        assert!(!Connecting.can_transition_to(Active));
        assert!(!Active.can_transition_to(Authenticated));
        assert!(!Closed.can_transition_to(Closing));
        assert!(!Active.can_transition_to(Closed));
    }

    #[test]
    fn test_full_lifecycle() {
        let mut conn = Connection::accept("r1");
        assert_eq!(conn.state(), ConnectionState::Connecting);

        let identity = conn.authenticate(&StaticResolver, Some("good")).unwrap();
        assert_eq!(identity.display_name, "alice");
        assert_eq!(conn.state(), ConnectionState::Authenticated);

        let (tx, _rx) = mpsc::channel(1);
        let registration = conn.registration(tx).unwrap();
        assert_eq!(registration.room_id, "r1");
        assert_eq!(registration.id, conn.id());

        conn.activate().unwrap();
        conn.begin_close(CloseReason::IdleTimeout);
        conn.begin_close(CloseReason::ReadError);
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert_eq!(conn.close_reason(), Some(CloseReason::IdleTimeout));

        conn.finish_close();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_missing_room_rejected_first() {
        let mut conn = Connection::accept("  ");
        assert!(matches!(
            conn.authenticate(&StaticResolver, None),
            Err(ConnectError::MissingRoom)
        ));
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_missing_and_invalid_credentials() {
        let mut conn = Connection::accept("r1");
        assert!(matches!(
            conn.authenticate(&StaticResolver, None),
            Err(ConnectError::Auth(AuthError::MissingCredential))
        ));
        assert!(matches!(
            conn.authenticate(&StaticResolver, Some("bad")),
            Err(ConnectError::Auth(AuthError::InvalidToken(_)))
        ));
        assert!(conn.identity().is_none());
    }

    #[test]
    fn test_cannot_activate_before_auth() {
        let mut conn = Connection::accept("r1");
        assert!(conn.activate().is_err());

        let (tx, _rx) = mpsc::channel(1);
        assert!(conn.registration(tx).is_err());
    }

    #[test]
    fn test_close_before_activation() {
        let mut conn = Connection::accept("r1");
        conn.finish_close();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.close_reason(), Some(CloseReason::PeerGone));
    }
}
