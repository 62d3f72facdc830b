//! View de-duplication.
//!
//! A view counts once per `(content, client, UTC day)`.

use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{NaiveDate, Utc};

use storyvault_core::{ContentId, UserId, ViewFingerprint};
use storyvault_store::{Store, ViewOutcome};

use crate::error::ApiError;
use crate::retry::{retry_on_conflict, run_blocking, RetryPolicy};

/// Client identifier used when a request carries nothing better.
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// Counts distinct daily views.
#[derive(Clone)]
pub struct ViewGate {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
}

impl ViewGate {
    /// Create a gate over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Record a view of `content_id` by `client_identifier` now.
    pub async fn record_view(
        &self,
        content_id: &ContentId,
        client_identifier: &str,
    ) -> Result<ViewOutcome, ApiError> {
        let fingerprint = ViewFingerprint::new(content_id.clone(), client_identifier, Utc::now());

        let outcome = retry_on_conflict(self.retry, "record_view", || {
            let fingerprint = fingerprint.clone();
            run_blocking(&self.store, move |s| s.record_view(&fingerprint))
        })
        .await?;

        tracing::debug!(
            content_id = %content_id,
            counted = %outcome.counted,
            views = %outcome.views,
            "View recorded"
        );
        Ok(outcome)
    }

    /// Distinct views of `content_id` so far.
    pub async fn views(&self, content_id: &ContentId) -> Result<u64, ApiError> {
        let id = content_id.clone();
        let stats = run_blocking(&self.store, move |s| s.get_content_stats(&id)).await?;
        Ok(stats.map_or(0, |stats| stats.views))
    }

    /// Drop fingerprints of days before `day`, and returns the cut-off used
    /// with the number removed.
    ///
    /// The cut-off never passes today: the current day's fingerprints are what
    /// keeps a repeated view from counting twice.
    pub async fn purge_before(&self, day: NaiveDate) -> Result<(NaiveDate, usize), ApiError> {
        let cutoff = day.min(Utc::now().date_naive());
        let removed =
            run_blocking(&self.store, move |s| s.purge_fingerprints_before(cutoff)).await?;
        tracing::info!(before = %cutoff, removed = %removed, "View fingerprints purged");
        Ok((cutoff, removed))
    }
}

/// Identify the client behind a view: the user id when authenticated, else
/// the first `X-Forwarded-For` hop, else `X-Real-IP`.
#[must_use]
pub fn client_identifier(user_id: Option<&UserId>, headers: &HeaderMap) -> String {
    if let Some(user_id) = user_id {
        return format!("user:{user_id}");
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .map_or_else(|| ANONYMOUS_CLIENT.to_string(), |ip| format!("ip:{ip}"))
}
