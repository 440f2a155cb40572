//! Read Receipt Routes
//!
//! - POST /api/v1/conversations/:cid/read - Move the caller's receipt forward
//! - GET /api/v1/conversations/:cid/unread - Unread count for the caller

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::{parse_conversation_id, require_member};
use crate::api::dto::{MarkReadRequest, MarkReadResponse};
use crate::api::error::ApiResult;
use crate::api::extract::AuthUser;
use crate::api::state::AppState;
use crate::store::UnreadState;
use crate::types::now_millis;
use crate::websocket::Event;

/// POST /api/v1/conversations/:cid/read
///
/// Body is optional; `ts` defaults to now. The receipt never moves backwards,
/// and the response carries the stored position. Other members are notified
/// with `receipt.updated`.
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(cid): Path<String>,
    body: Option<Json<MarkReadRequest>>,
) -> ApiResult<Json<MarkReadResponse>> {
    let conversation = parse_conversation_id(&cid)?;
    require_member(&state, conversation, user).await?;

    let requested = body
        .and_then(|Json(req)| req.ts)
        .filter(|&ts| ts > 0)
        .unwrap_or_else(now_millis);

    let last_read_ts = state.store.mark_read(conversation, user, requested)?;

    match Event::receipt_updated(conversation, user, last_read_ts) {
        Ok(event) => {
            state.hub.publish(event);
        }
        Err(e) => tracing::error!(
            conversation_id = %conversation,
            error = %e,
            "Receipt stored but event could not be encoded"
        ),
    }

    Ok(Json(MarkReadResponse {
        ok: true,
        last_read_ts,
    }))
}

/// GET /api/v1/conversations/:cid/unread
pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(cid): Path<String>,
) -> ApiResult<Json<UnreadState>> {
    let conversation = parse_conversation_id(&cid)?;
    require_member(&state, conversation, user).await?;

    Ok(Json(state.store.unread_state(conversation, user)?))
}
