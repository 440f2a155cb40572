//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Serialize};

use crate::store::{Conversation, ConversationSummary, Message, MessageQuery};
use crate::types::UserId;

// ============================================
// CONVERSATION DTOs
// ============================================

/// Create conversation request
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    /// Optional title, defaults to "New Conversation"
    #[serde(default)]
    pub title: Option<String>,
    /// Other members; the caller is always added
    #[serde(default)]
    pub members: Vec<UserId>,
}

/// Conversation list response
#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
    pub total: usize,
}

/// Create conversation response
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    #[serde(flatten)]
    pub conversation: Conversation,
    /// True when an existing two-member conversation was returned
    pub reused: bool,
}

// ============================================
// MESSAGE DTOs
// ============================================

/// Send message request
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Message type, only "text" is accepted
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub body: String,
}

/// History query parameters (ms since epoch)
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub before: Option<i64>,
    #[serde(default)]
    pub since: Option<i64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl From<HistoryParams> for MessageQuery {
    fn from(params: HistoryParams) -> Self {
        MessageQuery {
            before: params.before,
            since: params.since,
            limit: params.limit,
        }
    }
}

/// Message history response, newest first
#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
    pub count: usize,
}

// ============================================
// RECEIPT DTOs
// ============================================

/// Mark-read request
#[derive(Debug, Default, Deserialize)]
pub struct MarkReadRequest {
    /// Read position (ms since epoch), defaults to now
    #[serde(default)]
    pub ts: Option<i64>,
}

/// Mark-read response
#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub ok: bool,
    /// Stored receipt position, never earlier than before the call
    pub last_read_ts: i64,
}

// ============================================
// IDENTITY DTOs
// ============================================

/// Caller identity response
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: UserId,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "degraded"
    pub status: String,
    /// Store status: "ok" or "error"
    pub store: String,
    /// Conversations with at least one joined connection
    pub rooms: usize,
    /// Joined WebSocket connections
    pub connections: usize,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Server version
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_defaults() {
        let req: CreateConversationRequest = serde_json::from_str("{}").unwrap();
        assert!(req.title.is_none());
        assert!(req.members.is_empty());
    }

    #[test]
    fn test_send_message_type_field() {
        let req: SendMessageRequest =
            serde_json::from_str(r#"{"type":"text","body":"hi"}"#).unwrap();
        assert_eq!(req.kind.as_deref(), Some("text"));
        assert_eq!(req.body, "hi");
    }

    #[test]
    fn test_history_params_into_query() {
        let query: MessageQuery = HistoryParams {
            before: Some(10),
            since: None,
            limit: Some(5),
        }
        .into();
        assert_eq!(query.before, Some(10));
        assert_eq!(query.effective_limit(), 5);
    }
}
