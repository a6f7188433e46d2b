//! WebSocket Handler
//!
//! Validates the room and credential before upgrading, then hands the
//! socket to the session driver.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{future, SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;

use super::connection::Connection;
use super::messages::Frame;
use super::pump::PumpConfig;
use super::hub::HubHandle;
use super::session::run_session;
use crate::api::{ApiResult, AppState};
use crate::auth::credential_from_request;

/// Query parameters on the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    pub room_id: Option<String>,
    pub token: Option<String>,
}

/// GET /api/v1/ws?room_id=<id>[&token=<jwt>]
///
/// Rejects with 400 when the room id is missing and 401 when the credential
/// is missing or invalid. Neither case upgrades the connection.
pub async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> ApiResult<Response> {
    let mut connection = Connection::accept(query.room_id.unwrap_or_default());
    let credential = credential_from_request(&headers, query.token.as_deref());

    let user_id = connection
        .authenticate(state.authority.as_ref(), credential.as_deref())?
        .id
        .clone();
    tracing::debug!(
        connection_id = %connection.id(),
        room_id = %connection.room_id(),
        user_id = %user_id,
        "Connection authenticated"
    );

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let hub = state.hub.clone();
    let config = PumpConfig::from(&state.connection);

    Ok(ws
        .max_message_size(config.max_frame_bytes)
        .max_frame_size(config.max_frame_bytes)
        .on_upgrade(move |socket| handle_socket(socket, connection, hub, config)))
}

async fn handle_socket(socket: WebSocket, connection: Connection, hub: HubHandle, config: PumpConfig) {
    let (sink, stream) = socket.split();

    let sink = sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(to_ws(frame))));
    let stream = stream.map(|item| item.map(from_ws));

    run_session(connection, sink, stream, hub, config).await;
}

fn to_ws(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(text) => WsMessage::Text(text),
        Frame::Binary(data) => WsMessage::Binary(data),
        Frame::Ping(data) => WsMessage::Ping(data),
        Frame::Pong(data) => WsMessage::Pong(data),
        Frame::Close => WsMessage::Close(None),
    }
}

fn from_ws(message: WsMessage) -> Frame {
    match message {
        WsMessage::Text(text) => Frame::Text(text),
        WsMessage::Binary(data) => Frame::Binary(data),
        WsMessage::Ping(data) => Frame::Ping(data),
        WsMessage::Pong(data) => Frame::Pong(data),
        WsMessage::Close(_) => Frame::Close,
    }
}
