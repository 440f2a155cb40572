//! WebSocket Real-Time Fan-Out
//!
//! Pushes conversation events to connected clients.
//!
//! ## Architecture
//!
//! - **RoomHub**: Maps each conversation to its joined connections and fans events out
//! - **Endpoint**: One connection's bounded outbound queue and close signal
//! - **Handler**: Authenticates, authorizes and upgrades, then runs the connection lifecycle
//! - **Messages**: Defines the pushed event format
//!
//! ## Usage
//!
//! Clients connect to `/api/v1/ws/{conversation_id}` with a bearer token
//! (header, or `?token=` as a fallback) and receive every event published
//! to that conversation while they stay connected.
//!
//! ```javascript
//! const ws = new WebSocket(`ws://localhost:8080/api/v1/ws/${cid}?token=${jwt}`);
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'message.created') render(msg.payload);
//! };
//! ```

mod endpoint;
mod handler;
mod hub;
mod messages;

pub use endpoint::{DeliveryError, Endpoint, EndpointHandle, EndpointId};
pub use handler::{websocket_handler, ConnectionError, ConnectionTimeouts, UpgradeParams};
pub use hub::{HubConfig, HubStats, PublishReport, RoomHub};
pub use messages::{Event, EventKind, MessageCreated, ReceiptUpdated};
