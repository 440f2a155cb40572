//! Document Store
//!
//! Durable storage for conversations, messages and read receipts, plus the
//! [`MembershipOracle`] used to gate real-time subscriptions.

mod error;
mod sqlite;
mod types;

pub use error::{StoreError, StoreResult};
pub use sqlite::ChatStore;
pub use types::{
    Conversation, ConversationSummary, CreatedConversation, Member, Message, MessageQuery, Role,
    UnreadState, DEFAULT_PAGE_SIZE, DEFAULT_TITLE, MAX_BODY_LEN, MAX_PAGE_SIZE, TEXT_MESSAGE,
};

use async_trait::async_trait;
use std::sync::Arc;

use crate::types::{ConversationId, UserId};

/// Answers "is this subject a member of that conversation?"
///
/// Lookup failures are errors, never an implicit yes.
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    async fn is_member(&self, user: UserId, conversation: ConversationId) -> StoreResult<bool>;
}

/// Membership oracle backed by a [`ChatStore`].
///
/// SQLite calls block, so each lookup runs on the blocking pool and the
/// calling task stays free to time out.
#[derive(Clone)]
pub struct StoreMembership {
    store: Arc<ChatStore>,
}

impl StoreMembership {
    pub fn new(store: Arc<ChatStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MembershipOracle for StoreMembership {
    async fn is_member(&self, user: UserId, conversation: ConversationId) -> StoreResult<bool> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.has_member(conversation, user)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_store_membership_answers_from_store() {
        let store = Arc::new(ChatStore::open_in_memory().unwrap());
        let (alice, bob, mallory) = (UserId::new(), UserId::new(), UserId::new());
        let cid = store
            .create_conversation(alice, "", &[bob])
            .unwrap()
            .conversation
            .id;

        let oracle = StoreMembership::new(store);
        assert!(oracle.is_member(bob, cid).await.unwrap());
        assert!(!oracle.is_member(mallory, cid).await.unwrap());
        assert!(!oracle.is_member(alice, ConversationId::new()).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stalled_lookup_can_be_timed_out() {
        let store = Arc::new(ChatStore::open_in_memory().unwrap());
        let oracle = StoreMembership::new(Arc::clone(&store));

        // Another thread holds the connection well past the deadline
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            let _conn = store.conn().unwrap();
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(400));
        });
        locked_rx.recv().unwrap();

        let started = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            oracle.is_member(UserId::new(), ConversationId::new()),
        )
        .await;

        assert!(result.is_err(), "lookup should time out while the store is busy");
        assert!(started.elapsed() < Duration::from_millis(300));
        holder.join().unwrap();
    }
}
