//! Conversation Routes
//!
//! - POST /api/v1/conversations - Create a conversation (or reuse a direct one)
//! - GET /api/v1/conversations - List the caller's conversations

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::{ConversationListResponse, ConversationResponse, CreateConversationRequest};
use crate::api::error::ApiResult;
use crate::api::extract::AuthUser;
use crate::api::state::AppState;
use crate::store::DEFAULT_TITLE;

/// POST /api/v1/conversations
///
/// Returns 201 for a new conversation, 200 when an existing two-member
/// conversation between the same pair is reused.
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateConversationRequest>,
) -> ApiResult<(StatusCode, Json<ConversationResponse>)> {
    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TITLE);

    let created = state.store.create_conversation(user, title, &req.members)?;

    let status = if created.reused {
        StatusCode::OK
    } else {
        tracing::info!(
            conversation_id = %created.conversation.id,
            members = created.conversation.members.len(),
            "Created conversation"
        );
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(ConversationResponse {
            conversation: created.conversation,
            reused: created.reused,
        }),
    ))
}

/// GET /api/v1/conversations
///
/// Newest first, each with the caller's unread count and the latest message.
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<ConversationListResponse>> {
    let conversations = state.store.list_conversations(user)?;

    Ok(Json(ConversationListResponse {
        total: conversations.len(),
        conversations,
    }))
}
