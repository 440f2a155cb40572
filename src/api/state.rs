//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::{JwtVerifier, TokenVerifier};
use crate::config::Config;
use crate::store::{ChatStore, MembershipOracle, StoreMembership};
use crate::websocket::{ConnectionTimeouts, HubConfig, RoomHub};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Document store for conversations, messages and receipts
    pub store: Arc<ChatStore>,
    /// Per-conversation fan-out of real-time events
    pub hub: Arc<RoomHub>,
    /// Verifies bearer credentials
    pub verifier: Arc<dyn TokenVerifier>,
    /// Gates WebSocket subscriptions
    pub membership: Arc<dyn MembershipOracle>,
    /// Loaded configuration
    pub config: Arc<Config>,
    /// Deadlines for joined WebSocket connections
    pub timeouts: ConnectionTimeouts,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Wire the default collaborators: JWT verification and store-backed membership
    pub fn new(store: Arc<ChatStore>, config: Config) -> Self {
        let verifier = Arc::new(JwtVerifier::new(&config.auth.jwt_secret));
        let membership = Arc::new(StoreMembership::new(Arc::clone(&store)));
        Self::with_parts(store, verifier, membership, config)
    }

    /// Build state from explicit collaborators
    pub fn with_parts(
        store: Arc<ChatStore>,
        verifier: Arc<dyn TokenVerifier>,
        membership: Arc<dyn MembershipOracle>,
        config: Config,
    ) -> Self {
        let hub = RoomHub::new(HubConfig {
            queue_capacity: config.realtime.queue_capacity,
            max_connections: config.realtime.max_connections,
        });

        Self {
            store,
            hub: Arc::new(hub),
            verifier,
            membership,
            timeouts: ConnectionTimeouts::from(&config.realtime),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Deadline for store lookups made while serving a request
    pub fn request_timeout(&self) -> Duration {
        self.config.api.request_timeout()
    }
}
