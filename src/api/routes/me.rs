//! Caller Identity Route
//!
//! - GET /api/v1/me - Echo the authenticated caller

use axum::Json;

use crate::api::dto::MeResponse;
use crate::api::extract::AuthUser;

/// GET /api/v1/me
pub async fn me(AuthUser(user): AuthUser) -> Json<MeResponse> {
    Json(MeResponse { user_id: user })
}
