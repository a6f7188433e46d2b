//! WebSocket Real-Time Chat
//!
//! Room-scoped message fan-out over WebSocket connections.
//!
//! ## Architecture
//!
//! - **Hub**: A single task that owns the set of live connections and
//!   serializes register, unregister and broadcast
//! - **Connection**: Per-session lifecycle and authentication
//! - **Pumps**: One ingress and one egress loop per connection
//! - **Session**: Runs the pumps and guarantees teardown
//! - **Handler**: Axum upgrade endpoint
//! - **Messages**: Wire payloads and the transport-neutral frame type
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8080/api/v1/ws?room_id=ROOM&token=JWT');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({content: 'hello'}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   console.log(msg.sender, msg.content);
//! };
//! ```

mod connection;
mod handler;
mod hub;
mod messages;
mod pump;
mod session;

pub use connection::{CloseReason, ConnectError, Connection, ConnectionConfig, ConnectionState};
pub use handler::{websocket_handler, ConnectQuery};
pub use hub::{ConnectionId, Hub, HubConfig, HubError, HubHandle, HubStats, Registration};
pub use messages::{Frame, FrameError, InboundFrame, Outbound, OutboundFrame};
pub use pump::{egress, ingress, IngressContext, PumpConfig};
pub use session::run_session;
