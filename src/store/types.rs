//! Document types persisted by the chat store

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{ConversationId, MessageId, UserId};

/// Default title for conversations created without one
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Only supported message type
pub const TEXT_MESSAGE: &str = "text";

/// Maximum message body length in bytes
pub const MAX_BODY_LEN: usize = 2048;

/// Default and maximum page sizes for message history
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 200;

/// Role of a member within a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "member" => Ok(Role::Member),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: UserId,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub members: Vec<Member>,
    /// Creation time (ms since epoch)
    pub created_at: i64,
}

impl Conversation {
    pub fn has_member(&self, user: UserId) -> bool {
        self.members.iter().any(|m| m.user_id == user)
    }
}

/// Result of creating a conversation
#[derive(Debug, Clone)]
pub struct CreatedConversation {
    pub conversation: Conversation,
    /// An existing two-member conversation was returned instead of a new one
    pub reused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    #[serde(rename = "type")]
    pub kind: String,
    pub body: String,
    /// Send time (ms since epoch)
    pub ts: i64,
}

/// A conversation as listed for one member
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub unread: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_msg: Option<Message>,
}

/// Paging window for message history.
///
/// `since` selects messages strictly newer than it; otherwise `before`
/// selects messages strictly older (default: now). Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub before: Option<i64>,
    pub since: Option<i64>,
    pub limit: Option<usize>,
}

impl MessageQuery {
    /// Effective page size: default when unset or zero, clamped to the maximum
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            Some(n) if n > 0 => n.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        }
    }
}

/// Unread state of one member in one conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnreadState {
    pub unread: i64,
    pub last_read_ts: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit() {
        assert_eq!(MessageQuery::default().effective_limit(), 50);
        let q = MessageQuery {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(q.effective_limit(), 50);
        let q = MessageQuery {
            limit: Some(500),
            ..Default::default()
        };
        assert_eq!(q.effective_limit(), 200);
        let q = MessageQuery {
            limit: Some(7),
            ..Default::default()
        };
        assert_eq!(q.effective_limit(), 7);
    }

    #[test]
    fn test_role_roundtrip() {
        assert_eq!("owner".parse::<Role>().unwrap(), Role::Owner);
        assert_eq!(Role::Member.to_string(), "member");
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_message_serializes_kind_as_type() {
        let msg = Message {
            id: MessageId::new(),
            conversation_id: ConversationId::new(),
            sender_id: UserId::new(),
            kind: TEXT_MESSAGE.to_string(),
            body: "Hello".to_string(),
            ts: 1,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"text\""));
    }
}
