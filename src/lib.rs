//! # Chatline
//!
//! A small real-time chat backend: conversations, message history and read
//! receipts over REST, plus per-conversation event fan-out over WebSocket.
//!
//! ## Features
//!
//! - **Rooms**: Connections join the room of exactly one conversation
//! - **Non-blocking fan-out**: Publishing never waits on a slow client; a full
//!   outbound queue evicts that connection instead of dropping events silently
//! - **Gated subscriptions**: Credential and membership are checked before upgrade
//! - **Durable history**: SQLite-backed conversations, messages and receipts
//!
//! ## Modules
//!
//! - [`websocket`]: Room hub, connection endpoints and lifecycle handler
//! - [`store`]: Document store and membership oracle
//! - [`auth`]: Bearer credential verification
//! - [`api`]: REST API server with Axum
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatline::websocket::{Event, RoomHub};
//! use chatline::types::{ConversationId, UserId};
//!
//! let hub = RoomHub::default();
//! let conversation = ConversationId::new();
//!
//! let endpoint = hub.create_endpoint(UserId::new(), conversation);
//! hub.join(&endpoint.handle);
//!
//! let event = Event::receipt_updated(conversation, UserId::new(), 42)?;
//! let report = hub.publish(event);
//! assert_eq!(report.delivered, 1);
//! # Ok::<(), serde_json::Error>(())
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod store;
pub mod types;
pub mod websocket;

// Re-export top-level types for convenience
pub use types::{ConversationId, MessageId, UserId};

pub use api::{build_router, serve, ApiError, AppState};

pub use auth::{AuthError, JwtVerifier, TokenVerifier};

pub use store::{ChatStore, MembershipOracle, StoreError, StoreMembership, StoreResult};

pub use websocket::{
    websocket_handler, Event, EventKind, HubConfig, HubStats, PublishReport, RoomHub,
};

pub use config::{Config, ConfigError};
