//! Message Routes
//!
//! - POST /api/v1/messages/:cid - Send a message and push `message.created`
//! - GET /api/v1/messages/:cid - Page through history

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::{parse_conversation_id, require_member};
use crate::api::dto::{HistoryParams, MessageListResponse, SendMessageRequest};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::AuthUser;
use crate::api::state::AppState;
use crate::store::{Message, MAX_BODY_LEN, TEXT_MESSAGE};
use crate::websocket::{Event, MessageCreated};

/// POST /api/v1/messages/:cid
///
/// Stores the message, then publishes it to every connection joined to the
/// conversation. Publishing never blocks the response.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(cid): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let conversation = parse_conversation_id(&cid)?;
    let kind = validate_message(&req)?;

    require_member(&state, conversation, user).await?;

    let message = state
        .store
        .insert_message(conversation, user, kind, &req.body)?;

    match Event::message_created(conversation, MessageCreated::from(&message)) {
        Ok(event) => {
            let report = state.hub.publish(event);
            tracing::debug!(
                conversation_id = %conversation,
                message_id = %message.id,
                delivered = report.delivered,
                evicted = report.evicted,
                "Message stored and published"
            );
        }
        Err(e) => tracing::error!(
            conversation_id = %conversation,
            message_id = %message.id,
            error = %e,
            "Message stored but event could not be encoded"
        ),
    }

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/v1/messages/:cid?before=&since=&limit=
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(cid): Path<String>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<MessageListResponse>> {
    let conversation = parse_conversation_id(&cid)?;
    require_member(&state, conversation, user).await?;

    let messages = state.store.list_messages(conversation, &params.into())?;

    Ok(Json(MessageListResponse {
        count: messages.len(),
        messages,
    }))
}

impl From<&Message> for MessageCreated {
    fn from(message: &Message) -> Self {
        MessageCreated {
            id: message.id,
            sender_id: message.sender_id,
            kind: message.kind.clone(),
            body: message.body.clone(),
            ts: message.ts,
        }
    }
}

/// Only text messages of 1 to 2048 bytes are accepted
fn validate_message(req: &SendMessageRequest) -> ApiResult<&'static str> {
    match req.kind.as_deref() {
        None | Some("") | Some(TEXT_MESSAGE) => {}
        Some(_) => return Err(ApiError::Validation("unsupported message type".to_string())),
    }

    if req.body.is_empty() || req.body.len() > MAX_BODY_LEN {
        return Err(ApiError::Validation(format!(
            "body must be 1-{} bytes",
            MAX_BODY_LEN
        )));
    }

    Ok(TEXT_MESSAGE)
}
