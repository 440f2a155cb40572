//! Chatline REST API
//!
//! HTTP API layer for Chatline, built with Axum.
//!
//! # Endpoints
//!
//! ## Identity
//! - `GET /api/v1/me` - The authenticated caller
//!
//! ## Conversations
//! - `POST /api/v1/conversations` - Create a conversation
//! - `GET /api/v1/conversations` - List the caller's conversations
//!
//! ## Messages
//! - `POST /api/v1/messages/:cid` - Send a message
//! - `GET /api/v1/messages/:cid` - Message history
//!
//! ## Receipts
//! - `POST /api/v1/conversations/:cid/read` - Mark read
//! - `GET /api/v1/conversations/:cid/unread` - Unread count
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /api/v1/ws/:cid` - Real-time events for one conversation
//!
//! # Example
//!
//! ```rust,ignore
//! use chatline::api::{serve, AppState};
//! use chatline::config::Config;
//! use chatline::store::ChatStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let store = Arc::new(ChatStore::open(&config.store.database_path)?);
//!
//!     let state = AppState::new(store, config);
//!     serve(state).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use extract::AuthUser;
pub use state::AppState;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::websocket::websocket_handler;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    build_router_shared(Arc::new(state))
}

fn build_router_shared(shared_state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/me", get(routes::me::me))
        // Conversation routes
        .route(
            "/conversations",
            post(routes::conversations::create_conversation)
                .get(routes::conversations::list_conversations),
        )
        .route("/conversations/:cid/read", post(routes::receipts::mark_read))
        .route("/conversations/:cid/unread", get(routes::receipts::unread_count))
        // Message routes
        .route(
            "/messages/:cid",
            post(routes::messages::send_message).get(routes::messages::list_messages),
        )
        // WebSocket route
        .route("/ws/:cid", get(websocket_handler));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let cors = cors_layer(&shared_state.config.api.cors_origins);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// Permissive when no origins are configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

/// Start the API server
///
/// On shutdown every joined WebSocket connection is closed so graceful
/// shutdown does not wait on long-lived sockets.
pub async fn serve(state: AppState) -> Result<(), ApiError> {
    let addr = state.config.api.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!("Chatline API listening on {}", addr);
    serve_on(listener, state, shutdown_signal()).await?;
    tracing::info!("Chatline API shut down gracefully");
    Ok(())
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve_on<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> Result<(), ApiError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let shared_state = Arc::new(state);
    let hub = Arc::clone(&shared_state.hub);
    let router = build_router_shared(shared_state);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.await;
            hub.close_all();
        })
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
