//! WebSocket clients against the real router on a loopback listener

use futures_util::{SinkExt, StreamExt};
use huddle::auth::JwtAuthority;
use huddle::store::{Identity, SqliteStore};
use huddle::websocket::{ConnectionConfig, Hub, HubConfig, HubHandle};
use huddle::{build_router, AppState};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    addr: SocketAddr,
    hub: HubHandle,
    store: Arc<SqliteStore>,
    authority: Arc<JwtAuthority>,
}

impl Server {
    async fn start() -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let authority = Arc::new(JwtAuthority::new(b"upgrade-secret", "huddle", 24));
        let (hub, _task) = Hub::spawn(HubConfig::default(), store.clone());
        let state = AppState::new(
            store.clone(),
            authority.clone(),
            hub.clone(),
            ConnectionConfig::default(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = build_router(state, &[]);
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            addr,
            hub,
            store,
            authority,
        }
    }

    async fn join(&self, user: &Identity, room: &str) -> Socket {
        let token = self.authority.issue(user).unwrap();
        let url = format!("ws://{}/api/v1/ws?room_id={}&token={}", self.addr, room, token);
        let (socket, _) = connect_async(url).await.unwrap();
        socket
    }

    async fn wait_for_connections(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.hub.stats().await.unwrap().connections != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection count never settled");
    }
}

async fn next_text(socket: &mut Socket) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a message")
            .expect("socket closed")
            .unwrap();
        match message {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected a text message, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_relay_between_real_sockets() {
    let server = Server::start().await;

    let mut alice = server.join(&Identity::new("user-a", "alice"), "r1").await;
    let mut bob = server.join(&Identity::new("user-b", "bob"), "r1").await;
    server.wait_for_connections(2).await;

    alice
        .send(Message::Text(r#"{"content": "hello bob"}"#.to_string()))
        .await
        .unwrap();

    let received = next_text(&mut bob).await;
    assert_eq!(received["content"], "hello bob");
    assert_eq!(received["roomId"], "r1");
    assert_eq!(received["senderId"], "user-a");
    assert_eq!(received["sender"], "alice");
    assert!(received["timestamp"].is_string());

    // Echo is on by default
    assert_eq!(next_text(&mut alice).await["content"], "hello bob");
    assert_eq!(server.store.message_count("r1").unwrap(), 1);

    alice.close(None).await.unwrap();
    server.wait_for_connections(1).await;
}

#[tokio::test]
async fn test_oversized_frame_disconnects_sender() {
    let server = Server::start().await;

    let mut alice = server.join(&Identity::new("user-a", "alice"), "r1").await;
    let mut bob = server.join(&Identity::new("user-b", "bob"), "r1").await;
    server.wait_for_connections(2).await;

    let limit = ConnectionConfig::default().max_frame_bytes;
    let body = serde_json::json!({ "content": "x".repeat(limit * 2) }).to_string();
    // The server may drop the socket before the write is acknowledged
    let _ = alice.send(Message::Text(body)).await;

    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match alice.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "sender was not disconnected");

    server.wait_for_connections(1).await;
    assert_eq!(server.store.message_count("r1").unwrap(), 0);

    // The room keeps working for everyone else
    bob.send(Message::Text(r#"{"content": "still here"}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut bob).await["content"], "still here");
}
