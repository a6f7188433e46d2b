//! Session driver
//!
//! Wires an authenticated [`Connection`] to the hub and runs its pumps until
//! either side stops. Teardown always unregisters before the transport is
//! released.

use futures_util::{Sink, Stream};
use std::fmt::Display;
use tokio::sync::{mpsc, oneshot};

use super::connection::{CloseReason, Connection};
use super::hub::HubHandle;
use super::messages::Frame;
use super::pump::{egress, ingress, send, IngressContext, PumpConfig};

/// Run one session to completion and return the connection in `Closed`.
///
/// The connection must already be authenticated.
pub async fn run_session<K, S, E>(
    mut connection: Connection,
    mut sink: K,
    mut stream: S,
    hub: HubHandle,
    config: PumpConfig,
) -> Connection
where
    K: Sink<Frame> + Unpin + Send + 'static,
    K::Error: Display,
    S: Stream<Item = Result<Frame, E>> + Unpin,
    E: Display,
{
    let (outbound_tx, outbound_rx) = mpsc::channel(hub.outbound_capacity());

    let registered = match connection.registration(outbound_tx) {
        Ok(registration) => hub.register(registration).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    if let Err(e) = registered {
        tracing::warn!(connection_id = %connection.id(), error = %e, "Registration failed");
        if let Err(reason) = send(&mut sink, Frame::Close, &config).await {
            tracing::debug!(connection_id = %connection.id(), reason = %reason, "Close frame not delivered");
        }
        connection.begin_close(CloseReason::HubUnavailable);
        connection.finish_close();
        return connection;
    }

    if let Err(e) = connection.activate() {
        tracing::error!(connection_id = %connection.id(), error = %e, "Cannot activate connection");
        hub.unregister(connection.id()).await;
        connection.begin_close(CloseReason::HubUnavailable);
        connection.finish_close();
        return connection;
    }

    tracing::info!(
        connection_id = %connection.id(),
        room_id = %connection.room_id(),
        user_id = %connection.identity().map(|i| i.id.as_str()).unwrap_or_default(),
        "Connection active"
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let egress_task = tokio::spawn(async move {
        let reason = egress(&mut sink, outbound_rx, &config).await;
        let _ = stop_tx.send(());
        reason
    });

    let reason = match connection.identity().cloned() {
        Some(identity) => {
            let ctx = IngressContext {
                connection_id: connection.id(),
                room_id: connection.room_id(),
                identity: &identity,
            };
            ingress(&mut stream, ctx, &hub, &config, stop_rx).await
        }
        None => CloseReason::HubUnavailable,
    };

    // Unregistering drops the hub's sender, which lets egress drain and exit
    hub.unregister(connection.id()).await;

    let reason = match egress_task.await {
        Ok(egress_reason) if reason == CloseReason::EgressStopped => egress_reason,
        Ok(_) => reason,
        Err(e) => {
            tracing::error!(connection_id = %connection.id(), error = %e, "Egress task failed");
            reason
        }
    };

    connection.begin_close(reason);
    connection.finish_close();
    connection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, IdentityResolver};
    use crate::store::{Identity, Message, SqliteStore};
    use crate::websocket::connection::ConnectionState;
    use crate::websocket::hub::{Hub, HubConfig};
    use futures_util::{sink, stream, StreamExt};
    use std::sync::Arc;
    use std::time::Duration;

    struct StaticResolver;

    impl IdentityResolver for StaticResolver {
        fn resolve(&self, credential: &str) -> Result<Identity, AuthError> {
            Ok(Identity::new(credential, credential))
        }
    }

    fn authenticated(user: &str, room: &str) -> Connection {
        let mut connection = Connection::accept(room);
        connection.authenticate(&StaticResolver, Some(user)).unwrap();
        connection
    }

    type FrameSink = std::pin::Pin<Box<dyn Sink<Frame, Error = String> + Send>>;

    fn recorder(tx: mpsc::UnboundedSender<Frame>) -> FrameSink {
        Box::pin(sink::unfold(tx, |tx, frame: Frame| async move {
            tx.send(frame).map_err(|e| e.to_string())?;
            Ok::<_, String>(tx)
        }))
    }

    fn inbound(
        rx: mpsc::UnboundedReceiver<Frame>,
    ) -> impl Stream<Item = Result<Frame, String>> + Unpin {
        Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (Ok(frame), rx))
        }))
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (hub, _task) = Hub::spawn(HubConfig::default(), store.clone());

        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let session = tokio::spawn(run_session(
            authenticated("alice", "r1"),
            recorder(out_tx),
            inbound(in_rx),
            hub.clone(),
            PumpConfig::default(),
        ));

        in_tx
            .send(Frame::Text(r#"{"content": "hello"}"#.to_string()))
            .unwrap();

        // Echo is on by default
        let frame = out_rx.recv().await.unwrap();
        let Frame::Text(text) = frame else {
            panic!("expected text frame, got {:?}", frame);
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["content"], "hello");
        assert_eq!(value["sender"], "alice");

        in_tx.send(Frame::Close).unwrap();
        let connection = session.await.unwrap();

        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(connection.close_reason(), Some(CloseReason::ClientClosed));
        assert_eq!(hub.stats().await.unwrap().connections, 0);
        assert_eq!(store.message_count("r1").unwrap(), 1);

        // Egress drained and sent a close frame after unregistering
        assert_eq!(out_rx.recv().await, Some(Frame::Close));
    }

    #[tokio::test]
    async fn test_session_closed_by_hub_eviction() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let config = HubConfig {
            outbound_capacity: 1,
            ..HubConfig::default()
        };
        let (hub, _task) = Hub::spawn(config, store);

        // Transport that never completes a write
        let stalled: FrameSink = Box::pin(sink::unfold((), |_, _frame: Frame| async move {
            std::future::pending::<()>().await;
            Ok::<_, String>(())
        }));
        let (_in_tx, in_rx) = mpsc::unbounded_channel();
        let connection = authenticated("bob", "r1");
        let id = connection.id().to_string();

        let session = tokio::spawn(run_session(
            connection,
            stalled,
            inbound(in_rx),
            hub.clone(),
            PumpConfig {
                write_timeout: Duration::from_millis(50),
                ..PumpConfig::default()
            },
        ));

        while !hub.is_registered(&id).await.unwrap() {
            tokio::task::yield_now().await;
        }
        for n in 0..3 {
            let message = Message::new("r1", Identity::new("alice", "alice"), format!("m{}", n));
            hub.broadcast(message, None).await.unwrap();
        }

        let connection = session.await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(connection.close_reason(), Some(CloseReason::WriteTimeout));
        assert!(!hub.is_registered(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_session_registration_failure_closes() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (hub, task) = Hub::spawn(HubConfig::default(), store);
        hub.shutdown().await;
        task.await.unwrap();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let input = stream::empty::<Result<Frame, String>>();

        let connection = run_session(
            authenticated("carol", "r1"),
            recorder(out_tx),
            input.boxed(),
            hub,
            PumpConfig::default(),
        )
        .await;

        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(connection.close_reason(), Some(CloseReason::HubUnavailable));
        assert_eq!(out_rx.recv().await, Some(Frame::Close));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_failure_close_is_bounded_by_write_timeout() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (hub, task) = Hub::spawn(HubConfig::default(), store);
        hub.shutdown().await;
        task.await.unwrap();

        let stalled: FrameSink = Box::pin(sink::unfold((), |_, _frame: Frame| async move {
            std::future::pending::<()>().await;
            Ok::<_, String>(())
        }));
        let config = PumpConfig {
            write_timeout: Duration::from_secs(10),
            ..PumpConfig::default()
        };

        let connection = tokio::time::timeout(
            Duration::from_secs(3600),
            run_session(
                authenticated("dave", "r1"),
                stalled,
                stream::empty::<Result<Frame, String>>().boxed(),
                hub,
                config,
            ),
        )
        .await
        .expect("session stuck writing the close frame");

        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(connection.close_reason(), Some(CloseReason::HubUnavailable));
    }
}
