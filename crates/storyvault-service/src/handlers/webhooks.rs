//! Webhook handlers for Stripe.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use storyvault_core::{PaymentSession, PaymentStatus, UserId};

use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::{verify_webhook_signature, CheckoutSession, WebhookEvent};

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was processed.
    pub received: bool,
    /// Whether credits were applied by this delivery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<bool>,
}

/// Handle Stripe webhooks.
///
/// Events are only accepted with a valid `Stripe-Signature`; without a
/// configured webhook secret every delivery is refused.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let secret = state.config.stripe_webhook_secret.as_deref().ok_or_else(|| {
        tracing::warn!("Stripe webhook received but no webhook secret is configured");
        ApiError::BadRequest("Webhook signing is not configured".into())
    })?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing Stripe signature".into()))?;

    verify_webhook_signature(secret, &body, signature, Utc::now().timestamp()).map_err(|e| {
        tracing::warn!(error = %e, "Invalid Stripe webhook signature");
        ApiError::BadRequest("Invalid webhook signature".into())
    })?;

    let event: WebhookEvent =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %event.event_type,
        event_id = %event.id,
        "Received Stripe webhook"
    );

    let applied = match event.event_type.as_str() {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            handle_checkout_completed(&state, event.data.object).await?
        }
        _ => {
            tracing::debug!(event_type = %event.event_type, "Unhandled Stripe event");
            None
        }
    };

    Ok(Json(WebhookResponse {
        received: true,
        applied,
    }))
}

/// Settle a completed checkout. Returns `None` when the session is not paid
/// yet; Stripe sends `async_payment_succeeded` once it is.
async fn handle_checkout_completed(
    state: &AppState,
    object: serde_json::Value,
) -> Result<Option<bool>, ApiError> {
    let checkout: CheckoutSession = serde_json::from_value(object)
        .map_err(|e| ApiError::BadRequest(format!("Invalid checkout session: {e}")))?;
    let session: PaymentSession = checkout.to_payment_session();

    if session.status != PaymentStatus::Paid {
        tracing::info!(
            session_id = %session.session_id,
            payment_status = %session.status,
            "Checkout session not paid yet, skipping"
        );
        return Ok(None);
    }

    let reference = session
        .client_reference_id
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("Missing client_reference_id".into()))?;
    let user_id = UserId::new(state.aliases.resolve(reference))?;

    tracing::info!(
        user_id = %user_id,
        session_id = %session.session_id,
        credits_amount = ?session.credits_amount,
        amount_total = ?session.amount_total,
        "Processing checkout completion"
    );

    let settlement = state.payments.settle_session(&user_id, &session).await?;
    Ok(Some(settlement.applied))
}
