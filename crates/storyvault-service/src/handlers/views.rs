//! View counting handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use storyvault_core::ContentId;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::views::client_identifier;

/// View count response.
#[derive(Debug, Serialize)]
pub struct ViewsResponse {
    /// Content ID.
    pub content_id: String,
    /// Whether this request was counted. Absent on reads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counted: Option<bool>,
    /// Distinct daily views.
    pub views: u64,
}

/// Record a view. Signed-in readers are identified by user id, others by
/// their client address.
pub async fn record_view(
    State(state): State<Arc<AppState>>,
    Path(content_id): Path<String>,
    auth: Option<AuthUser>,
    headers: HeaderMap,
) -> Result<Json<ViewsResponse>, ApiError> {
    let content_id: ContentId = content_id.parse()?;
    let client = client_identifier(auth.as_ref().map(|a| &a.user_id), &headers);

    let outcome = state.views.record_view(&content_id, &client).await?;

    Ok(Json(ViewsResponse {
        content_id: content_id.to_string(),
        counted: Some(outcome.counted),
        views: outcome.views,
    }))
}

/// Current view count.
pub async fn get_views(
    State(state): State<Arc<AppState>>,
    Path(content_id): Path<String>,
) -> Result<Json<ViewsResponse>, ApiError> {
    let content_id: ContentId = content_id.parse()?;
    let views = state.views.views(&content_id).await?;

    Ok(Json(ViewsResponse {
        content_id: content_id.to_string(),
        counted: None,
        views,
    }))
}
