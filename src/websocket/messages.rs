//! WebSocket Event Types
//!
//! Defines the notifications pushed from the server to connected clients.
//! The channel is push-only: clients never send application messages.
//!
//! ```json
//! {
//!   "type": "message.created",
//!   "conversation_id": "<cid>",
//!   "payload": { "id": "<mid>", "sender_id": "<uid>", "type": "text", "body": "hi", "ts": 1712345678901 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ConversationId, MessageId, UserId};

/// Kind of a pushed event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A message was stored in the conversation
    #[serde(rename = "message.created")]
    MessageCreated,
    /// A member's read receipt moved forward
    #[serde(rename = "receipt.updated")]
    ReceiptUpdated,
}

impl EventKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageCreated => "message.created",
            EventKind::ReceiptUpdated => "receipt.updated",
        }
    }
}

/// A notification routed to every connection joined to `conversation_id`.
///
/// The payload is opaque to the fan-out layer; only `conversation_id` is used
/// for routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub conversation_id: ConversationId,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

/// Payload of a `message.created` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageCreated {
    pub id: MessageId,
    pub sender_id: UserId,
    #[serde(rename = "type")]
    pub kind: String,
    pub body: String,
    pub ts: i64,
}

/// Payload of a `receipt.updated` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptUpdated {
    pub user_id: UserId,
    pub last_read_ts: i64,
}

impl Event {
    /// Build an event with an arbitrary structured payload
    pub fn new(kind: EventKind, conversation_id: ConversationId, payload: Value) -> Self {
        Self {
            kind,
            conversation_id,
            payload,
        }
    }

    /// Create a `message.created` event
    pub fn message_created(
        conversation_id: ConversationId,
        message: MessageCreated,
    ) -> serde_json::Result<Self> {
        Ok(Self::new(
            EventKind::MessageCreated,
            conversation_id,
            serde_json::to_value(message)?,
        ))
    }

    /// Create a `receipt.updated` event
    pub fn receipt_updated(
        conversation_id: ConversationId,
        user_id: UserId,
        last_read_ts: i64,
    ) -> serde_json::Result<Self> {
        Ok(Self::new(
            EventKind::ReceiptUpdated,
            conversation_id,
            serde_json::to_value(ReceiptUpdated {
                user_id,
                last_read_ts,
            })?,
        ))
    }

    /// Serialize to the JSON text sent over the socket
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_created_wire_shape() {
        let cid = ConversationId::new();
        let sender = UserId::new();
        let mid = MessageId::new();
        let event = Event::message_created(
            cid,
            MessageCreated {
                id: mid,
                sender_id: sender,
                kind: "text".to_string(),
                body: "hi".to_string(),
                ts: 1712345678901,
            },
        )
        .unwrap();

        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "message.created");
        assert_eq!(value["conversation_id"], cid.to_string());
        assert_eq!(value["payload"]["id"], mid.to_string());
        assert_eq!(value["payload"]["sender_id"], sender.to_string());
        assert_eq!(value["payload"]["type"], "text");
        assert_eq!(value["payload"]["body"], "hi");
        assert_eq!(value["payload"]["ts"], 1712345678901_i64);
    }

    #[test]
    fn test_receipt_updated_wire_shape() {
        let cid = ConversationId::new();
        let user = UserId::new();
        let event = Event::receipt_updated(cid, user, 42).unwrap();

        let json = event.to_json().unwrap();
        assert!(json.contains("\"type\":\"receipt.updated\""));
        assert!(json.contains(&format!("\"user_id\":\"{}\"", user)));
        assert!(json.contains("\"last_read_ts\":42"));
    }

    #[test]
    fn test_null_payload_is_omitted() {
        let event = Event::new(EventKind::MessageCreated, ConversationId::new(), Value::Null);
        let json = event.to_json().unwrap();
        assert!(!json.contains("payload"));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(EventKind::MessageCreated.as_str(), "message.created");
        assert_eq!(EventKind::ReceiptUpdated.as_str(), "receipt.updated");
    }
}
