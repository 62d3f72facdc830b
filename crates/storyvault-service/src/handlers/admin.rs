//! Admin handlers. All require the `X-Admin-Key` header.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use storyvault_core::{ContestId, LedgerEntry, UserId};

use crate::auth::AdminAuth;
use crate::balance::BalanceAudit;
use crate::error::ApiError;
use crate::handlers::contests::ContestResponse;
use crate::handlers::credits::EntryResponse;
use crate::retry::{retry_on_conflict, run_blocking, RetryPolicy};
use crate::settlement::Settlement;
use crate::state::AppState;

/// Kind of admin adjustment.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// Promotional or compensating credits (positive).
    #[default]
    Grant,
    /// Signed correction.
    Correction,
}

/// Admin credit adjustment request.
#[derive(Debug, Deserialize)]
pub struct AdjustCreditsRequest {
    /// Target user.
    pub user_id: String,
    /// Signed amount in credits.
    pub amount: i64,
    /// Grant (default) or correction.
    #[serde(default)]
    pub kind: AdjustmentKind,
    /// Reason, recorded as the entry description.
    pub reason: String,
    /// Makes retries safe.
    #[serde(default)]
    pub external_ref: Option<String>,
}

/// Admin credit adjustment response.
#[derive(Debug, Serialize)]
pub struct AdjustCreditsResponse {
    /// `false` if the external reference had already been applied.
    pub applied: bool,
    /// Balance after the call.
    pub balance: i64,
    /// The recorded entry.
    pub entry: EntryResponse,
}

/// Grant or correct a user's credits.
pub async fn adjust_credits(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<AdjustCreditsRequest>,
) -> Result<Json<AdjustCreditsResponse>, ApiError> {
    let user_id: UserId = body.user_id.parse()?;
    let reason = body.reason.trim();
    if reason.is_empty() {
        return Err(ApiError::BadRequest("reason is required".into()));
    }

    let mut entry = match body.kind {
        AdjustmentKind::Grant => LedgerEntry::admin_grant(user_id.clone(), body.amount, reason)?,
        AdjustmentKind::Correction => {
            LedgerEntry::admin_correction(user_id.clone(), body.amount, reason)?
        }
    };
    if let Some(external_ref) = body.external_ref.filter(|r| !r.trim().is_empty()) {
        entry = entry.with_external_ref(external_ref);
    }

    let retry = RetryPolicy::new(state.config.conflict_retry_attempts);
    let outcome = retry_on_conflict(retry, "append_entry", || {
        let entry = entry.clone();
        run_blocking(&state.store, move |s| s.append_entry(entry))
    })
    .await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        user_id = %user_id,
        amount = %body.amount,
        applied = %outcome.applied,
        balance = %outcome.balance,
        "Admin credit adjustment"
    );

    Ok(Json(AdjustCreditsResponse {
        applied: outcome.applied,
        balance: outcome.balance,
        entry: EntryResponse::from(&outcome.entry),
    }))
}

/// Create contest request.
#[derive(Debug, Deserialize)]
pub struct CreateContestRequest {
    /// Contest ID; generated when absent.
    #[serde(default)]
    pub contest_id: Option<String>,
    /// Title.
    pub title: String,
    /// Voting window start.
    pub voting_opens_at: DateTime<Utc>,
    /// Voting window end (exclusive).
    pub voting_closes_at: DateTime<Utc>,
}

/// Create a contest.
pub async fn create_contest(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<CreateContestRequest>,
) -> Result<(StatusCode, Json<ContestResponse>), ApiError> {
    let contest_id = body
        .contest_id
        .as_deref()
        .map(str::parse::<ContestId>)
        .transpose()?;

    let contest = state
        .votes
        .create_contest(
            contest_id,
            &body.title,
            body.voting_opens_at,
            body.voting_closes_at,
        )
        .await?;

    tracing::info!(admin_id = %admin.admin_id, contest_id = %contest.id, "Admin created contest");

    Ok((StatusCode::CREATED, Json(ContestResponse::from(&contest))))
}

/// Admin settlement request.
#[derive(Debug, Deserialize)]
pub struct SettlePaymentRequest {
    /// User to credit.
    pub user_id: String,
    /// Payment session ID.
    pub session_id: String,
    /// Credits to apply.
    pub credits: i64,
}

/// Settle a payment session for a user.
pub async fn settle_payment(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<SettlePaymentRequest>,
) -> Result<Json<Settlement>, ApiError> {
    let user_id: UserId = body.user_id.parse()?;
    let session_id = body.session_id.trim();
    if session_id.is_empty() {
        return Err(ApiError::BadRequest("session_id is required".into()));
    }

    let settlement = state
        .payments
        .settle(&user_id, session_id, body.credits)
        .await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        user_id = %user_id,
        session_id = %session_id,
        applied = %settlement.applied,
        "Admin settled payment session"
    );

    Ok(Json(settlement))
}

/// Compare a user's cached balance with the ledger and repair it.
pub async fn audit_account(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceAudit>, ApiError> {
    let user_id: UserId = user_id.parse()?;
    let audit = state.balances.audit(&user_id).await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        user_id = %user_id,
        consistent = %audit.consistent,
        "Balance audited"
    );

    Ok(Json(audit))
}

/// Purge request. Without fields, everything before today is removed.
#[derive(Debug, Default, Deserialize)]
pub struct PurgeViewsRequest {
    /// Remove fingerprints of days strictly before this one. Later days are
    /// capped to today.
    #[serde(default)]
    pub before: Option<NaiveDate>,
    /// Alternatively, keep this many past days besides today.
    #[serde(default)]
    pub retain_days: Option<u64>,
}

/// Purge response.
#[derive(Debug, Serialize)]
pub struct PurgeViewsResponse {
    /// Cut-off day actually applied.
    pub before: NaiveDate,
    /// Fingerprints removed.
    pub removed: usize,
}

/// Delete view fingerprints of past days.
pub async fn purge_views(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    body: Option<Json<PurgeViewsRequest>>,
) -> Result<Json<PurgeViewsResponse>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let today = Utc::now().date_naive();

    let before = match (body.before, body.retain_days) {
        (Some(day), _) => day,
        (None, Some(days)) => today
            .checked_sub_days(Days::new(days))
            .ok_or_else(|| ApiError::BadRequest("retain_days out of range".into()))?,
        (None, None) => today,
    };

    let (before, removed) = state.views.purge_before(before).await?;

    tracing::info!(admin_id = %admin.admin_id, before = %before, removed = %removed, "Views purged");

    Ok(Json(PurgeViewsResponse { before, removed }))
}
