//! API Routes
//!
//! Route handlers organized by functionality.

pub mod conversations;
pub mod health;
pub mod me;
pub mod messages;
pub mod receipts;

use tokio::time::timeout;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::types::{ConversationId, UserId};

/// Parse a conversation id taken from the request path
pub(crate) fn parse_conversation_id(raw: &str) -> ApiResult<ConversationId> {
    raw.parse()
        .map_err(|_| ApiError::Validation("invalid conversation id".to_string()))
}

/// Fail with 403 unless `user` belongs to `conversation`.
///
/// A lookup error is a 500 and a lookup slower than the request timeout is a 503.
pub(crate) async fn require_member(
    state: &AppState,
    conversation: ConversationId,
    user: UserId,
) -> ApiResult<()> {
    let lookup = timeout(
        state.request_timeout(),
        state.membership.is_member(user, conversation),
    )
    .await
    .map_err(|_| {
        tracing::warn!(conversation_id = %conversation, "Membership lookup timed out");
        ApiError::ServiceUnavailable("membership lookup timed out".to_string())
    })?;

    if lookup? {
        Ok(())
    } else {
        Err(ApiError::Forbidden("not a member".to_string()))
    }
}
