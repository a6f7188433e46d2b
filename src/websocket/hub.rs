//! WebSocket Connection Hub
//!
//! The single serialized coordinator for live connections. One task owns
//! the connection set and processes register, unregister and broadcast
//! commands strictly in arrival order; everything else talks to it through
//! a cloneable [`HubHandle`].
//!
//! The hub holds the only sender of each connection's outbound queue, so
//! removing a connection from the set is also what closes its queue.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tokio::task::JoinHandle;

use super::messages::{Outbound, OutboundFrame};
use crate::store::{Identity, Message, MessageStore};

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// Configuration for the connection hub
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Capacity of the hub's command channel
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
    /// Capacity of each connection's outbound queue
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
    /// Deliver messages back to the connection that sent them
    #[serde(default = "default_echo_to_sender")]
    pub echo_to_sender: bool,
    /// Maximum number of concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_command_capacity() -> usize {
    1024
}

fn default_outbound_capacity() -> usize {
    256
}

fn default_echo_to_sender() -> bool {
    true
}

fn default_max_connections() -> usize {
    10_000
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_capacity: default_command_capacity(),
            outbound_capacity: default_outbound_capacity(),
            echo_to_sender: default_echo_to_sender(),
            max_connections: default_max_connections(),
        }
    }
}

/// Everything the hub needs to deliver to a connection
#[derive(Debug)]
pub struct Registration {
    pub id: ConnectionId,
    pub identity: Identity,
    pub room_id: String,
    pub outbound: mpsc::Sender<Outbound>,
}

/// Snapshot of the live set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    pub connections: usize,
    /// Live connections per room
    pub rooms: HashMap<String, usize>,
}

/// Errors that can occur when talking to the hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection already registered: {0}")]
    AlreadyRegistered(ConnectionId),

    #[error("Hub is not running")]
    Closed,
}

enum HubCommand {
    Register {
        registration: Registration,
        reply: oneshot::Sender<Result<(), HubError>>,
    },
    Unregister {
        id: ConnectionId,
    },
    Broadcast {
        message: Message,
        origin: Option<ConnectionId>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
    IsRegistered {
        id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

struct Subscriber {
    identity: Identity,
    room_id: String,
    outbound: mpsc::Sender<Outbound>,
}

/// Result of one fan-out pass
#[derive(Debug, Default, PartialEq, Eq)]
struct Delivery {
    delivered: usize,
    dropped: usize,
}

/// The hub event loop state
pub struct Hub {
    connections: HashMap<ConnectionId, Subscriber>,
    store: Arc<dyn MessageStore>,
    config: HubConfig,
    commands: mpsc::Receiver<HubCommand>,
}

impl Hub {
    /// Start the hub loop on the current runtime
    pub fn spawn(config: HubConfig, store: Arc<dyn MessageStore>) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.command_capacity.max(1));
        let handle = HubHandle {
            commands: tx,
            outbound_capacity: config.outbound_capacity.max(1),
        };

        let hub = Hub {
            connections: HashMap::new(),
            store,
            config,
            commands: rx,
        };

        (handle, tokio::spawn(hub.run()))
    }

    async fn run(mut self) {
        tracing::info!(
            echo_to_sender = self.config.echo_to_sender,
            outbound_capacity = self.config.outbound_capacity,
            "Hub started"
        );

        while let Some(command) = self.commands.recv().await {
            match command {
                HubCommand::Register {
                    registration,
                    reply,
                } => {
                    let _ = reply.send(self.register(registration));
                }
                HubCommand::Unregister { id } => self.unregister(&id),
                HubCommand::Broadcast { message, origin } => {
                    self.broadcast(message, origin.as_deref()).await;
                }
                HubCommand::Stats { reply } => {
                    let _ = reply.send(self.stats());
                }
                HubCommand::IsRegistered { id, reply } => {
                    let _ = reply.send(self.connections.contains_key(&id));
                }
                HubCommand::Shutdown => break,
            }
        }

        let remaining = self.connections.len();
        self.connections.clear();
        tracing::info!(closed = remaining, "Hub stopped");
    }

    fn register(&mut self, registration: Registration) -> Result<(), HubError> {
        if self.connections.contains_key(&registration.id) {
            tracing::error!(
                connection_id = %registration.id,
                "Connection registered twice, keeping the existing entry"
            );
            return Err(HubError::AlreadyRegistered(registration.id));
        }

        if self.connections.len() >= self.config.max_connections {
            tracing::warn!(
                limit = self.config.max_connections,
                "Rejecting connection, hub is full"
            );
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        tracing::info!(
            connection_id = %registration.id,
            user_id = %registration.identity.id,
            user = %registration.identity.display_name,
            room_id = %registration.room_id,
            "Client connected"
        );

        self.connections.insert(
            registration.id,
            Subscriber {
                identity: registration.identity,
                room_id: registration.room_id,
                outbound: registration.outbound,
            },
        );
        Ok(())
    }

    /// Remove a connection, closing its outbound queue. No-op if absent.
    fn unregister(&mut self, id: &str) {
        if let Some(subscriber) = self.connections.remove(id) {
            tracing::info!(
                connection_id = %id,
                user = %subscriber.identity.display_name,
                room_id = %subscriber.room_id,
                "Client disconnected"
            );
        }
    }

    async fn broadcast(&mut self, message: Message, origin: Option<&str>) {
        let store = Arc::clone(&self.store);
        let record = message.clone();
        let persisted = tokio::task::spawn_blocking(move || store.append(&record)).await;

        match persisted {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(
                    message_id = %message.id,
                    room_id = %message.room_id,
                    error = %e,
                    "Error saving message, dropping it"
                );
                return;
            }
            Err(e) => {
                tracing::error!(message_id = %message.id, error = %e, "Persist task failed, dropping message");
                return;
            }
        }

        let payload = match OutboundFrame::from(&message).encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(message_id = %message.id, error = %e, "Error encoding message");
                return;
            }
        };

        let delivery = self.fan_out(&message.room_id, origin, &payload);

        tracing::debug!(
            message_id = %message.id,
            room_id = %message.room_id,
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "Broadcast message"
        );
    }

    /// Non-blocking enqueue to every connection in `room_id`. Recipients
    /// whose queue is full or closed are removed in the same pass.
    fn fan_out(&mut self, room_id: &str, origin: Option<&str>, payload: &Outbound) -> Delivery {
        let mut delivery = Delivery::default();
        let mut stale = Vec::new();

        for (id, subscriber) in &self.connections {
            if subscriber.room_id != room_id {
                continue;
            }
            if !self.config.echo_to_sender && origin == Some(id.as_str()) {
                continue;
            }

            match subscriber.outbound.try_send(Arc::clone(payload)) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection_id = %id,
                        user = %subscriber.identity.display_name,
                        "Outbound queue full, dropping slow client"
                    );
                    stale.push(id.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(connection_id = %id, "Outbound queue already closed");
                    stale.push(id.clone());
                }
            }
        }

        delivery.dropped = stale.len();
        for id in stale {
            self.connections.remove(&id);
        }
        delivery
    }

    fn stats(&self) -> HubStats {
        let mut rooms = HashMap::new();
        for subscriber in self.connections.values() {
            *rooms.entry(subscriber.room_id.clone()).or_insert(0) += 1;
        }
        HubStats {
            connections: self.connections.len(),
            rooms,
        }
    }
}

/// Cloneable handle for submitting commands to the hub
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    outbound_capacity: usize,
}

impl HubHandle {
    /// Capacity to use when creating a connection's outbound queue
    pub fn outbound_capacity(&self) -> usize {
        self.outbound_capacity
    }

    /// Add a connection to the live set
    pub async fn register(&self, registration: Registration) -> Result<(), HubError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(HubCommand::Register {
                registration,
                reply,
            })
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)?
    }

    /// Remove a connection from the live set. Idempotent.
    pub async fn unregister(&self, id: &str) {
        let command = HubCommand::Unregister { id: id.to_string() };
        if self.commands.send(command).await.is_err() {
            tracing::debug!(connection_id = %id, "Hub already stopped, nothing to unregister");
        }
    }

    /// Submit a message for persistence and fan-out.
    ///
    /// Waits for channel capacity rather than dropping the request.
    pub async fn broadcast(&self, message: Message, origin: Option<&str>) -> Result<(), HubError> {
        self.commands
            .send(HubCommand::Broadcast {
                message,
                origin: origin.map(str::to_string),
            })
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Snapshot of the live set, taken in command order
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(HubCommand::Stats { reply })
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    pub async fn is_registered(&self, id: &str) -> Result<bool, HubError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(HubCommand::IsRegistered {
                id: id.to_string(),
                reply,
            })
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Stop the loop after all previously submitted commands. Every
    /// remaining outbound queue is closed.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(HubCommand::Shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SqliteStore, StoreError, StoreResult};
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Message store that always fails and counts attempts
    #[derive(Default)]
    struct FailingStore {
        attempts: AtomicUsize,
    }

    impl MessageStore for FailingStore {
        fn append(&self, _message: &Message) -> StoreResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("disk on fire".to_string()))
        }

        fn list_since(&self, _room_id: &str, _since: DateTime<Utc>) -> StoreResult<Vec<Message>> {
            Ok(Vec::new())
        }

        fn list_recent(&self, _room_id: &str, _limit: usize) -> StoreResult<Vec<Message>> {
            Ok(Vec::new())
        }
    }

    fn spawn_hub(config: HubConfig) -> (HubHandle, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (handle, _task) = Hub::spawn(config, store.clone());
        (handle, store)
    }

    async fn join(
        hub: &HubHandle,
        id: &str,
        room: &str,
        capacity: usize,
    ) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(capacity);
        hub.register(Registration {
            id: id.to_string(),
            identity: Identity::new(format!("user-{}", id), id),
            room_id: room.to_string(),
            outbound: tx,
        })
        .await
        .unwrap();
        rx
    }

    fn decode(payload: &Outbound) -> OutboundFrame {
        serde_json::from_str(payload).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.outbound_capacity, 256);
        assert_eq!(config.command_capacity, 1024);
        assert!(config.echo_to_sender);
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let (hub, _store) = spawn_hub(HubConfig::default());
        let _rx = join(&hub, "a", "r1", 8).await;

        assert!(hub.is_registered("a").await.unwrap());
        assert_eq!(hub.stats().await.unwrap().connections, 1);

        hub.unregister("a").await;
        assert!(!hub.is_registered("a").await.unwrap());
        assert_eq!(hub.stats().await.unwrap().connections, 0);
    }

    #[tokio::test]
    async fn test_unregister_closes_queue_and_is_idempotent() {
        let (hub, _store) = spawn_hub(HubConfig::default());
        let mut rx_a = join(&hub, "a", "r1", 8).await;
        let _rx_b = join(&hub, "b", "r1", 8).await;

        hub.unregister("a").await;
        hub.unregister("a").await;

        assert!(rx_a.recv().await.is_none());
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.rooms.get("r1"), Some(&1));
    }

    #[tokio::test]
    async fn test_duplicate_registration_keeps_existing() {
        let (hub, _store) = spawn_hub(HubConfig::default());
        let _rx = join(&hub, "a", "r1", 8).await;

        let (tx, _rx2) = mpsc::channel(8);
        let result = hub
            .register(Registration {
                id: "a".to_string(),
                identity: Identity::new("other", "other"),
                room_id: "r2".to_string(),
                outbound: tx,
            })
            .await;

        assert!(matches!(result, Err(HubError::AlreadyRegistered(_))));
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.rooms.get("r1"), Some(&1));
        assert_eq!(stats.rooms.get("r2"), None);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let config = HubConfig {
            max_connections: 2,
            ..HubConfig::default()
        };
        let (hub, _store) = spawn_hub(config);

        let _a = join(&hub, "a", "r1", 8).await;
        let _b = join(&hub, "b", "r1", 8).await;

        let (tx, _rx) = mpsc::channel(8);
        let result = hub
            .register(Registration {
                id: "c".to_string(),
                identity: Identity::new("c", "c"),
                room_id: "r1".to_string(),
                outbound: tx,
            })
            .await;

        assert!(matches!(result, Err(HubError::TooManyConnections(2))));
    }

    #[tokio::test]
    async fn test_broadcast_only_reaches_room() {
        let (hub, store) = spawn_hub(HubConfig::default());
        let mut rx_a = join(&hub, "a", "r1", 8).await;
        let mut rx_b = join(&hub, "b", "r1", 8).await;
        let mut rx_c = join(&hub, "c", "r2", 8).await;

        let message = Message::new("r1", Identity::new("user-a", "a"), "hello");
        hub.broadcast(message.clone(), Some("a")).await.unwrap();
        hub.stats().await.unwrap();

        let frame = decode(&rx_b.try_recv().unwrap());
        assert_eq!(frame.content, "hello");
        assert_eq!(frame.room_id, "r1");
        assert_eq!(frame.id, message.id);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());

        assert_eq!(store.message_count("r1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_echo_disabled_skips_origin() {
        let config = HubConfig {
            echo_to_sender: false,
            ..HubConfig::default()
        };
        let (hub, _store) = spawn_hub(config);
        let mut rx_a = join(&hub, "a", "r1", 8).await;
        let mut rx_b = join(&hub, "b", "r1", 8).await;

        let message = Message::new("r1", Identity::new("user-a", "a"), "hi");
        hub.broadcast(message, Some("a")).await.unwrap();
        hub.stats().await.unwrap();

        assert!(rx_a.try_recv().is_err());
        assert_eq!(decode(&rx_b.try_recv().unwrap()).content, "hi");
    }

    #[tokio::test]
    async fn test_persist_failure_blocks_fan_out() {
        let store = Arc::new(FailingStore::default());
        let (hub, _task) = Hub::spawn(HubConfig::default(), store.clone());
        let mut rx = join(&hub, "a", "r1", 8).await;

        let message = Message::new("r1", Identity::new("user-a", "a"), "lost");
        hub.broadcast(message, Some("a")).await.unwrap();
        hub.stats().await.unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(store.attempts.load(Ordering::SeqCst), 1);
        assert!(hub.is_registered("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_full_queue_drops_only_slow_recipient() {
        let (hub, _store) = spawn_hub(HubConfig::default());
        let mut slow = join(&hub, "slow", "r1", 1).await;
        let mut fast = join(&hub, "fast", "r1", 8).await;

        let sender = Identity::new("user-x", "x");
        hub.broadcast(Message::new("r1", sender.clone(), "one"), None)
            .await
            .unwrap();
        hub.broadcast(Message::new("r1", sender.clone(), "two"), None)
            .await
            .unwrap();
        hub.broadcast(Message::new("r1", sender, "three"), None)
            .await
            .unwrap();

        assert!(!hub.is_registered("slow").await.unwrap());
        assert!(hub.is_registered("fast").await.unwrap());

        // The slow client keeps what was queued, then sees the close
        assert_eq!(decode(&slow.recv().await.unwrap()).content, "one");
        assert!(slow.recv().await.is_none());

        let contents: Vec<String> = (0..3)
            .map(|_| decode(&fast.try_recv().unwrap()).content)
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_closed_receiver_removed_on_broadcast() {
        let (hub, _store) = spawn_hub(HubConfig::default());
        let rx = join(&hub, "gone", "r1", 8).await;
        drop(rx);

        hub.broadcast(Message::new("r1", Identity::new("u", "u"), "hi"), None)
            .await
            .unwrap();

        assert!(!hub.is_registered("gone").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_commands_are_serialized() {
        let (hub, store) = spawn_hub(HubConfig::default());

        let mut tasks = Vec::new();
        for i in 0..20 {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move {
                let id = format!("c{}", i);
                let (tx, rx) = mpsc::channel(64);
                hub.register(Registration {
                    id: id.clone(),
                    identity: Identity::new(&id, &id),
                    room_id: "r1".to_string(),
                    outbound: tx,
                })
                .await
                .unwrap();
                hub.broadcast(Message::new("r1", Identity::new(&id, &id), "x"), Some(&id))
                    .await
                    .unwrap();
                if i % 2 == 0 {
                    hub.unregister(&id).await;
                }
                rx
            }));
        }

        let mut receivers = Vec::new();
        for task in tasks {
            receivers.push(task.await.unwrap());
        }

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.connections, 10);
        assert_eq!(store.message_count("r1").unwrap(), 20);
    }

    #[tokio::test]
    async fn test_shutdown_closes_all_queues() {
        let (hub, _store) = spawn_hub(HubConfig::default());
        let mut rx = join(&hub, "a", "r1", 8).await;

        hub.shutdown().await;

        assert!(rx.recv().await.is_none());
        assert!(matches!(hub.stats().await, Err(HubError::Closed)));
    }
}
