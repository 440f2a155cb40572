//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.
//!
//! ```text
//! Requesting -> Authenticating -> AuthorizingMembership -> Upgrading -> Joined -> Leaving -> Closed
//!      \______________\___________________\___________________\______ Rejected
//! ```
//!
//! Every rejection happens before the upgrade, so nothing is allocated or
//! joined for a refused request. Once joined, a writer task and a reader task
//! run side by side. The first one to stop fires the endpoint's close signal;
//! the supervising task then performs the single teardown (leave the room,
//! close the socket).

use axum::{
    extract::{
        rejection::QueryRejection,
        ws::{close_code, rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::endpoint::{Endpoint, EndpointHandle};
use super::hub::RoomHub;
use super::messages::Event;
use crate::api::routes::{parse_conversation_id, require_member};
use crate::api::{ApiError, AppState};
use crate::auth::authenticate;
use crate::config::RealtimeConfig;
use crate::types::{ConversationId, UserId};

/// Deadlines applied by a connection's writer loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTimeouts {
    /// Idle time before a keep-alive ping
    pub idle: Duration,
    /// Deadline for writing one event
    pub write: Duration,
    /// Deadline for writing a ping
    pub ping: Duration,
}

impl Default for ConnectionTimeouts {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(25),
            write: Duration::from_secs(10),
            ping: Duration::from_secs(5),
        }
    }
}

impl From<&RealtimeConfig> for ConnectionTimeouts {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            idle: config.idle_timeout(),
            write: config.write_timeout(),
            ping: config.ping_timeout(),
        }
    }
}

/// Failures after a connection has joined
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("WebSocket transport error: {0}")]
    Transport(#[from] axum::Error),

    #[error("Write did not complete within {0:?}")]
    WriteTimeout(Duration),

    #[error("Failed to encode event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why one of the connection loops stopped
#[derive(Debug)]
pub enum LoopExit {
    /// The close signal fired (other loop, eviction, or shutdown)
    Closed,
    /// The peer closed the connection
    PeerClosed,
    /// The outbound queue has no producers left
    QueueClosed,
    /// Reading or writing failed
    Failed(ConnectionError),
}

/// Query parameters accepted on the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct UpgradeParams {
    /// Fallback credential for clients that cannot set headers
    pub token: Option<String>,
}

/// WebSocket upgrade handler for `GET /api/v1/ws/:cid`
///
/// Authenticates, checks membership, then upgrades. Rejections map to
/// 401 (credential), 400 (conversation id), 403 (not a member), 500
/// (membership lookup failed) and 503 (lookup timed out, or the connection
/// cap is reached).
pub async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(conversation): Path<String>,
    params: Result<Query<UpgradeParams>, QueryRejection>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let params = params.map(|Query(p)| p).unwrap_or_default();

    let (subject, conversation_id) =
        match admit(&state, &headers, params.token.as_deref(), &conversation).await {
            Ok(admitted) => admitted,
            Err(e) => return e.into_response(),
        };

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::debug!(
                conversation_id = %conversation_id,
                error = %rejection,
                "Rejected non-upgrade request"
            );
            return rejection.into_response();
        }
    };

    let hub = Arc::clone(&state.hub);
    let timeouts = state.timeouts;

    upgrade
        .on_failed_upgrade(move |e| {
            tracing::debug!(conversation_id = %conversation_id, error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| handle_socket(socket, hub, subject, conversation_id, timeouts))
}

/// Pre-upgrade checks. Nothing is allocated until all of them pass.
async fn admit(
    state: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
    conversation: &str,
) -> Result<(UserId, ConversationId), ApiError> {
    let subject = authenticate(state.verifier.as_ref(), headers, query_token).map_err(|e| {
        tracing::debug!(error = %e, "WebSocket credential rejected");
        ApiError::Unauthorized(e.to_string())
    })?;

    let conversation_id = parse_conversation_id(conversation)?;
    require_member(state, conversation_id, subject).await?;

    if state.hub.at_capacity() {
        return Err(ApiError::ServiceUnavailable(
            "too many realtime connections".to_string(),
        ));
    }

    Ok((subject, conversation_id))
}

/// Handle an established WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    hub: Arc<RoomHub>,
    subject: UserId,
    conversation_id: ConversationId,
    timeouts: ConnectionTimeouts,
) {
    let Endpoint { handle, outbound } = hub.create_endpoint(subject, conversation_id);
    hub.join(&handle);

    tracing::info!(
        connection_id = %handle.id(),
        conversation_id = %conversation_id,
        subject = %subject,
        "WebSocket connected"
    );

    let (sink, stream) = socket.split();
    drive(sink, stream, hub, handle, outbound, timeouts).await;
}

/// Run the paired loops of a joined endpoint and tear it down exactly once.
pub async fn drive<S, R>(
    sink: S,
    stream: R,
    hub: Arc<RoomHub>,
    handle: Arc<EndpointHandle>,
    outbound: mpsc::Receiver<Arc<Event>>,
    timeouts: ConnectionTimeouts,
) where
    S: Sink<Message, Error = axum::Error> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send + 'static,
{
    let close = handle.close_signal();
    let connection_id = handle.id();

    let mut send_task = tokio::spawn(write_loop(sink, outbound, close.clone(), timeouts));
    let mut recv_task = tokio::spawn(read_loop(stream, close.clone()));

    // Wait for either task to complete
    let (send_result, recv_result) = tokio::select! {
        sent = &mut send_task => {
            close.cancel();
            (sent, recv_task.await)
        }
        received = &mut recv_task => {
            close.cancel();
            (send_task.await, received)
        }
    };

    // Teardown: leave the room, then close the transport.
    // A false return means the hub already evicted this endpoint.
    let evicted = !hub.leave(&handle);

    match recv_result {
        Ok(exit) => log_exit(connection_id, "reader", &exit),
        Err(e) => tracing::error!(connection_id = %connection_id, error = %e, "Reader task failed"),
    }

    match send_result {
        Ok((mut sink, exit)) => {
            log_exit(connection_id, "writer", &exit);
            if let Some(frame) = close_frame(&exit, evicted) {
                let _ = send_frame(&mut sink, Message::Close(Some(frame)), timeouts.write).await;
                let _ = timeout(timeouts.write, sink.close()).await;
            }
        }
        Err(e) => tracing::error!(connection_id = %connection_id, error = %e, "Writer task failed"),
    }

    tracing::info!(
        connection_id = %connection_id,
        conversation_id = %handle.conversation_id(),
        evicted,
        "WebSocket disconnected"
    );
}

/// Drain the outbound queue onto the socket, pinging when idle.
///
/// Returns the sink so the caller can close it during teardown.
pub async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Arc<Event>>,
    close: CancellationToken,
    timeouts: ConnectionTimeouts,
) -> (S, LoopExit)
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let exit = loop {
        tokio::select! {
            biased;
            _ = close.cancelled() => break LoopExit::Closed,
            next = timeout(timeouts.idle, outbound.recv()) => match next {
                Ok(Some(event)) => {
                    let text = match event.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(
                                conversation_id = %event.conversation_id,
                                error = %e,
                                "Failed to serialize event"
                            );
                            break LoopExit::Failed(e.into());
                        }
                    };
                    if let Err(e) = send_frame(&mut sink, Message::Text(text), timeouts.write).await {
                        break LoopExit::Failed(e);
                    }
                }
                Ok(None) => break LoopExit::QueueClosed,
                Err(_idle) => {
                    if let Err(e) = send_frame(&mut sink, Message::Ping(Vec::new()), timeouts.ping).await {
                        break LoopExit::Failed(e);
                    }
                }
            }
        }
    };

    (sink, exit)
}

/// Read frames only to notice the peer going away.
///
/// The channel is push-only: text and binary frames are ignored, and
/// ping/pong bookkeeping is handled by the transport.
pub async fn read_loop<R>(mut stream: R, close: CancellationToken) -> LoopExit
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            _ = close.cancelled() => return LoopExit::Closed,
            frame = stream.next() => match frame {
                Some(Ok(Message::Close(_))) | None => return LoopExit::PeerClosed,
                Some(Ok(Message::Text(_))) | Some(Ok(Message::Binary(_))) => {
                    tracing::trace!("Ignoring client frame on push-only channel");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return LoopExit::Failed(ConnectionError::Transport(e)),
            }
        }
    }
}

/// Close frame for the teardown, or `None` when the transport is unusable
fn close_frame(exit: &LoopExit, evicted: bool) -> Option<CloseFrame<'static>> {
    match exit {
        LoopExit::Failed(ConnectionError::Transport(_) | ConnectionError::WriteTimeout(_)) => None,
        LoopExit::Failed(ConnectionError::Serialize(_)) => Some(CloseFrame {
            code: close_code::ERROR,
            reason: "event encoding failed".into(),
        }),
        _ if evicted => Some(CloseFrame {
            code: close_code::AGAIN,
            reason: "slow consumer".into(),
        }),
        _ => Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        }),
    }
}

async fn send_frame<S>(sink: &mut S, message: Message, deadline: Duration) -> Result<(), ConnectionError>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match timeout(deadline, sink.send(message)).await {
        Ok(result) => result.map_err(ConnectionError::from),
        Err(_) => Err(ConnectionError::WriteTimeout(deadline)),
    }
}

fn log_exit(connection_id: uuid::Uuid, side: &str, exit: &LoopExit) {
    match exit {
        LoopExit::Failed(e) => tracing::debug!(
            connection_id = %connection_id,
            side,
            error = %e,
            "WebSocket loop failed"
        ),
        other => tracing::debug!(
            connection_id = %connection_id,
            side,
            exit = ?other,
            "WebSocket loop stopped"
        ),
    }
}
