//! Credit balance and ledger handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use storyvault_core::LedgerEntry;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::retry::run_blocking;
use crate::state::AppState;
use crate::stripe::CheckoutRequest;

/// Smallest credit purchase.
const MIN_PURCHASE_CREDITS: i64 = 10;

/// Largest credit purchase.
const MAX_PURCHASE_CREDITS: i64 = 100_000;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// User ID.
    pub user_id: String,
    /// Balance in credits.
    pub credit_balance: i64,
    /// Newest ledger entry reflected in the balance.
    pub last_entry_id: Option<String>,
}

/// Get current credit balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state.balances.get_balance(&auth.user_id).await?;

    Ok(Json(BalanceResponse {
        user_id: account.user_id.to_string(),
        credit_balance: account.credit_balance,
        last_entry_id: account.last_entry_id.map(|id| id.to_string()),
    }))
}

/// Ledger list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListLedgerQuery {
    /// Maximum number of entries to return (default: 50, max: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Ledger entry response.
#[derive(Debug, Serialize)]
pub struct EntryResponse {
    /// Entry ID.
    pub id: String,
    /// Amount in credits (positive = credit, negative = debit).
    pub amount: i64,
    /// Why the balance changed.
    pub reason: String,
    /// External reference.
    pub external_ref: Option<String>,
    /// Balance after this entry.
    pub balance_after: i64,
    /// Description.
    pub description: String,
    /// Timestamp.
    pub created_at: String,
}

impl From<&LedgerEntry> for EntryResponse {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            amount: entry.amount,
            reason: entry.reason.as_str().to_string(),
            external_ref: entry.external_ref.clone(),
            balance_after: entry.balance_after,
            description: entry.description.clone(),
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

/// Ledger list response.
#[derive(Debug, Serialize)]
pub struct ListLedgerResponse {
    /// Entries (newest first).
    pub entries: Vec<EntryResponse>,
    /// Whether there are more entries.
    pub has_more: bool,
}

/// List ledger history.
pub async fn list_ledger(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListLedgerQuery>,
) -> Result<Json<ListLedgerResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit.clamp(1, 100);
    let (user_id, offset) = (auth.user_id.clone(), query.offset);
    let entries = run_blocking(&state.store, move |s| {
        s.list_entries_by_user(&user_id, limit + 1, offset)
    })
    .await?;

    let has_more = entries.len() > limit;
    let entries: Vec<_> = entries
        .iter()
        .take(limit)
        .map(EntryResponse::from)
        .collect();

    Ok(Json(ListLedgerResponse { entries, has_more }))
}

/// Purchase credits request.
#[derive(Debug, Deserialize)]
pub struct PurchaseCreditsRequest {
    /// Number of credits to buy.
    pub credits: i64,
}

/// Purchase credits response.
#[derive(Debug, Serialize)]
pub struct PurchaseCreditsResponse {
    /// Stripe checkout session URL.
    pub checkout_url: String,
    /// Session ID, passed to `verify-session` after payment.
    pub session_id: String,
    /// Amount charged, in cents.
    pub amount_cents: i64,
}

/// Initiate a credit purchase via Stripe Checkout.
pub async fn purchase_credits(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<PurchaseCreditsRequest>,
) -> Result<Json<PurchaseCreditsResponse>, ApiError> {
    if !(MIN_PURCHASE_CREDITS..=MAX_PURCHASE_CREDITS).contains(&body.credits) {
        return Err(ApiError::BadRequest(format!(
            "credits must be between {MIN_PURCHASE_CREDITS} and {MAX_PURCHASE_CREDITS}"
        )));
    }

    let stripe = state
        .stripe
        .as_ref()
        .ok_or_else(|| ApiError::ExternalService("Stripe not configured".into()))?;

    let user_id = auth.user_id.clone();
    let account = run_blocking(&state.store, move |s| s.get_account(&user_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    let amount_cents = body
        .credits
        .checked_mul(state.config.cents_per_credit)
        .ok_or_else(|| ApiError::BadRequest("purchase amount too large".into()))?;

    tracing::info!(
        user_id = %auth.user_id,
        credits = %body.credits,
        amount_cents = %amount_cents,
        "Initiating credit purchase"
    );

    let success_url = format!(
        "{}/credits/success?session_id={{CHECKOUT_SESSION_ID}}",
        state.config.frontend_url
    );
    let cancel_url = format!("{}/credits/cancel", state.config.frontend_url);

    let session = stripe
        .create_checkout_session(&CheckoutRequest {
            customer_id: account.stripe_customer_id.as_deref(),
            user_id: auth.user_id.as_str(),
            amount_cents,
            credits_amount: body.credits,
            success_url: &success_url,
            cancel_url: &cancel_url,
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create Stripe checkout session");
            ApiError::ExternalService(format!("Failed to create checkout session: {e}"))
        })?;

    let checkout_url = session
        .url
        .ok_or_else(|| ApiError::ExternalService("Stripe returned no checkout URL".into()))?;

    tracing::info!(
        user_id = %auth.user_id,
        session_id = %session.id,
        "Stripe checkout session created"
    );

    Ok(Json(PurchaseCreditsResponse {
        checkout_url,
        session_id: session.id,
        amount_cents,
    }))
}
