//! Request extractors

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::auth::authenticate;
use crate::types::UserId;

/// The authenticated caller of a REST request.
///
/// Only the `Authorization` header is accepted here; the query-string
/// fallback is reserved for WebSocket upgrades.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authenticate(state.verifier.as_ref(), &parts.headers, None)
            .map(AuthUser)
            .map_err(|e| ApiError::Unauthorized(e.to_string()))
    }
}
