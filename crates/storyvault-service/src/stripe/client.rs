//! Stripe API client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use storyvault_core::PaymentSession;

use super::types::{CheckoutSession, Customer, StripeErrorResponse};
use crate::crypto::{constant_time_eq, hmac_sha256_hex};
use crate::settlement::{PaymentError, PaymentProcessor};

/// Maximum age of a webhook signature timestamp, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Error type for Stripe operations.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe API returned an error.
    #[error("Stripe API error: {error_type} - {message}")]
    Api {
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// Invalid webhook signature.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Not a Checkout session ID.
    #[error("Invalid checkout session ID: {0}")]
    InvalidSessionId(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Parameters of a credit checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    /// Existing Stripe customer, if any.
    pub customer_id: Option<&'a str>,
    /// Our user id; becomes the session's `client_reference_id`.
    pub user_id: &'a str,
    /// Amount to charge, in cents.
    pub amount_cents: i64,
    /// Credits the payment buys; stored in the session metadata.
    pub credits_amount: i64,
    /// Redirect after payment.
    pub success_url: &'a str,
    /// Redirect after cancellation.
    pub cancel_url: &'a str,
}

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Stripe secret API key (`sk_test_...` or `sk_live_...`)
    /// * `base_url` - API base, normally [`crate::config::STRIPE_API_BASE`]
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StripeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StripeError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a new Stripe customer.
    ///
    /// # Arguments
    ///
    /// * `user_id` - Our internal user ID (stored as metadata)
    /// * `email` - Optional customer email
    pub async fn create_customer(
        &self,
        user_id: &str,
        email: Option<&str>,
    ) -> Result<Customer, StripeError> {
        let mut params = vec![("metadata[user_id]", user_id.to_string())];
        if let Some(email) = email {
            params.push(("email", email.to_string()));
        }

        let response = self
            .client
            .post(format!("{}/customers", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .header("Idempotency-Key", format!("customer-{user_id}"))
            .form(&params)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Create a Checkout session for purchasing credits.
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<CheckoutSession, StripeError> {
        let credits = request.credits_amount;
        let mut params = vec![
            ("mode", "payment".to_string()),
            ("success_url", request.success_url.to_string()),
            ("cancel_url", request.cancel_url.to_string()),
            ("client_reference_id", request.user_id.to_string()),
            ("line_items[0][price_data][currency]", "usd".to_string()),
            (
                "line_items[0][price_data][product_data][name]",
                "StoryVault Credits".to_string(),
            ),
            (
                "line_items[0][price_data][product_data][description]",
                format!("{credits} credits for contest voting"),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                request.amount_cents.to_string(),
            ),
            ("line_items[0][quantity]", "1".to_string()),
            ("metadata[user_id]", request.user_id.to_string()),
            ("metadata[credits_amount]", credits.to_string()),
        ];

        if let Some(cid) = request.customer_id {
            params.push(("customer", cid.to_string()));
        }

        tracing::debug!(
            user_id = %request.user_id,
            amount_cents = %request.amount_cents,
            credits_amount = %credits,
            "Creating Stripe checkout session"
        );

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .header("Idempotency-Key", uuid::Uuid::new_v4().to_string())
            .form(&params)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Retrieve a Checkout session by ID.
    ///
    /// The ID becomes a path segment, so anything but `cs_[A-Za-z0-9_]+` is
    /// refused before a request is made.
    pub async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, StripeError> {
        if !is_checkout_session_id(session_id) {
            return Err(StripeError::InvalidSessionId(session_id.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/checkout/sessions/{}", self.base_url, session_id))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_body: Result<StripeErrorResponse, _> = response.json().await;

        match error_body {
            Ok(stripe_error) => Err(StripeError::Api {
                error_type: stripe_error.error.error_type,
                message: stripe_error.error.message,
                code: stripe_error.error.code,
            }),
            Err(_) => Err(StripeError::Api {
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn fetch_session(&self, session_id: &str) -> Result<PaymentSession, PaymentError> {
        match self.get_checkout_session(session_id).await {
            Ok(session) => Ok(session.to_payment_session()),
            Err(StripeError::Api {
                code: Some(code), ..
            }) if code == "resource_missing" => Err(PaymentError::SessionNotFound(
                session_id.to_string(),
            )),
            Err(StripeError::InvalidSessionId(id)) => Err(PaymentError::SessionNotFound(id)),
            Err(e) => Err(PaymentError::Unavailable(e.to_string())),
        }
    }
}

/// Whether `id` has the shape of a Checkout session ID.
#[must_use]
pub fn is_checkout_session_id(id: &str) -> bool {
    id.strip_prefix("cs_").is_some_and(|rest| {
        !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
    })
}

/// Verify a `Stripe-Signature` header against the raw payload.
///
/// The header has the form `t=timestamp,v1=signature[,v1=...]`. The signature
/// is HMAC-SHA256 over `"{t}.{payload}"`; the timestamp must be within
/// [`SIGNATURE_TOLERANCE_SECS`] of `now`.
///
/// # Errors
///
/// Returns `StripeError::InvalidSignature` if the header is malformed, stale,
/// or carries no matching signature.
pub fn verify_webhook_signature(
    secret: &str,
    payload: &str,
    header: &str,
    now: i64,
) -> Result<(), StripeError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", ts)) => timestamp = Some(ts),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(StripeError::InvalidSignature)?;
    let issued_at: i64 = timestamp
        .parse()
        .map_err(|_| StripeError::InvalidSignature)?;

    if (now - issued_at).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(StripeError::InvalidSignature);
    }

    let expected = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"));

    if signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
        Ok(())
    } else {
        Err(StripeError::InvalidSignature)
    }
}

/// Build a `Stripe-Signature` header value for `payload`.
#[must_use]
pub fn sign_webhook_payload(secret: &str, payload: &str, timestamp: i64) -> String {
    let signature = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"));
    format!("t={timestamp},v1={signature}")
}
