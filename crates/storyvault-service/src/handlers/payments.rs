//! Payment verification handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::settlement::Settlement;
use crate::state::AppState;

/// Verify-session request.
#[derive(Debug, Deserialize)]
pub struct VerifySessionRequest {
    /// Checkout session ID returned by `/v1/credits/purchase`.
    pub session_id: String,
}

/// Settle a completed checkout session for the current user.
///
/// Safe to call repeatedly and concurrently with the Stripe webhook; credits
/// are applied once.
pub async fn verify_session(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<VerifySessionRequest>,
) -> Result<Json<Settlement>, ApiError> {
    let session_id = body.session_id.trim();
    if session_id.is_empty() {
        return Err(ApiError::BadRequest("session_id is required".into()));
    }

    let settlement = state
        .payments
        .settle_checkout(&auth.user_id, session_id)
        .await?;

    Ok(Json(settlement))
}
