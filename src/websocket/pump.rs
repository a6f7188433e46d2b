//! Ingress and egress pumps
//!
//! Each connection runs exactly two loops. The ingress pump reads frames,
//! decodes chat payloads and submits them to the hub. The egress pump is the
//! only writer on the transport: it drains the outbound queue and sends
//! periodic pings.
//!
//! Both are generic over `futures` streams and sinks of [`Frame`] so they can
//! run against any transport.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};

use super::connection::{CloseReason, ConnectionConfig};
use super::hub::HubHandle;
use super::messages::{Frame, FrameError, InboundFrame, Outbound};
use crate::store::{Identity, Message};

/// Timers and limits used by the pumps
#[derive(Debug, Clone, Copy)]
pub struct PumpConfig {
    pub max_frame_bytes: usize,
    pub read_timeout: Duration,
    pub ping_interval: Duration,
    pub write_timeout: Duration,
}

impl From<&ConnectionConfig> for PumpConfig {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            max_frame_bytes: config.max_frame_bytes,
            read_timeout: config.read_timeout(),
            ping_interval: config.ping_interval(),
            write_timeout: config.write_timeout(),
        }
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self::from(&ConnectionConfig::default())
    }
}

/// Who the ingress pump is reading for
pub struct IngressContext<'a> {
    pub connection_id: &'a str,
    pub room_id: &'a str,
    pub identity: &'a Identity,
}

/// Read frames until the connection must close.
///
/// Every received frame, pongs included, refreshes the read deadline.
/// Undecodable frames are dropped; the connection stays open.
pub async fn ingress<S, E>(
    stream: &mut S,
    ctx: IngressContext<'_>,
    hub: &HubHandle,
    config: &PumpConfig,
    mut stop: oneshot::Receiver<()>,
) -> CloseReason
where
    S: Stream<Item = Result<Frame, E>> + Unpin,
    E: Display,
{
    loop {
        let next = tokio::select! {
            _ = &mut stop => return CloseReason::EgressStopped,
            next = time::timeout(config.read_timeout, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                tracing::debug!(connection_id = %ctx.connection_id, "Read deadline exceeded");
                return CloseReason::IdleTimeout;
            }
            Ok(None) => return CloseReason::PeerGone,
            Ok(Some(Err(e))) => {
                tracing::debug!(connection_id = %ctx.connection_id, error = %e, "WebSocket receive error");
                return CloseReason::ReadError;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let text = match frame {
            Frame::Text(text) => text,
            Frame::Binary(data) => {
                if data.len() > config.max_frame_bytes {
                    return oversized(&ctx, data.len(), config.max_frame_bytes);
                }
                tracing::debug!(
                    connection_id = %ctx.connection_id,
                    error = %FrameError::Binary,
                    "Dropping inbound frame"
                );
                continue;
            }
            Frame::Ping(_) | Frame::Pong(_) => continue,
            Frame::Close => {
                tracing::debug!(connection_id = %ctx.connection_id, "Client requested close");
                return CloseReason::ClientClosed;
            }
        };

        if text.len() > config.max_frame_bytes {
            return oversized(&ctx, text.len(), config.max_frame_bytes);
        }

        let inbound = match InboundFrame::decode(&text) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::debug!(
                    connection_id = %ctx.connection_id,
                    error = %e,
                    "Dropping inbound frame"
                );
                continue;
            }
        };

        let message = Message::new(ctx.room_id, ctx.identity.clone(), inbound.content);
        if let Err(e) = hub.broadcast(message, Some(ctx.connection_id)).await {
            tracing::warn!(connection_id = %ctx.connection_id, error = %e, "Cannot submit message");
            return CloseReason::HubUnavailable;
        }
    }
}

fn oversized(ctx: &IngressContext<'_>, size: usize, limit: usize) -> CloseReason {
    tracing::warn!(
        connection_id = %ctx.connection_id,
        error = %FrameError::TooLarge { size, limit },
        "Closing connection"
    );
    CloseReason::FrameTooLarge
}

/// Drain the outbound queue to the transport until it closes or a write
/// fails. A closed queue produces a close frame before returning.
pub async fn egress<K>(
    sink: &mut K,
    mut outbound: mpsc::Receiver<Outbound>,
    config: &PumpConfig,
) -> CloseReason
where
    K: Sink<Frame> + Unpin,
    K::Error: Display,
{
    let mut ticker = time::interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            item = outbound.recv() => match item {
                Some(payload) => {
                    if let Err(reason) = send(sink, Frame::Text(payload.to_string()), config).await {
                        return reason;
                    }
                }
                None => {
                    // Best effort, the peer may already be gone
                    let _ = send(sink, Frame::Close, config).await;
                    return CloseReason::QueueClosed;
                }
            },
            _ = ticker.tick() => {
                if let Err(reason) = send(sink, Frame::Ping(Vec::new()), config).await {
                    return reason;
                }
            }
        }
    }
}

/// Write one frame, bounded by the write timeout
pub(super) async fn send<K>(
    sink: &mut K,
    frame: Frame,
    config: &PumpConfig,
) -> Result<(), CloseReason>
where
    K: Sink<Frame> + Unpin,
    K::Error: Display,
{
    match time::timeout(config.write_timeout, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "WebSocket send failed");
            Err(CloseReason::WriteError)
        }
        Err(_) => {
            tracing::debug!("WebSocket send timed out");
            Err(CloseReason::WriteTimeout)
        }
    }
}
