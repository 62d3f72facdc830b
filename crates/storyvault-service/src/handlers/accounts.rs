//! Account management handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use storyvault_core::Account;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::retry::run_blocking;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Email, if known.
    pub email: Option<String>,
    /// Current balance in credits.
    pub credit_balance: i64,
    /// Lifetime credits purchased.
    pub lifetime_purchased: i64,
    /// Lifetime credits granted.
    pub lifetime_granted: i64,
    /// Lifetime credits spent on votes.
    pub lifetime_spent: i64,
    /// Whether a payment customer is linked.
    pub payment_customer_linked: bool,
    /// Created timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            email: account.email.clone(),
            credit_balance: account.credit_balance,
            lifetime_purchased: account.lifetime_purchased,
            lifetime_granted: account.lifetime_granted,
            lifetime_spent: account.lifetime_spent,
            payment_customer_linked: account.stripe_customer_id.is_some(),
            created_at: account.created_at.to_rfc3339(),
            updated_at: account.updated_at.to_rfc3339(),
        }
    }
}

/// Create account request (optional fields for metadata).
#[derive(Debug, Default, Deserialize)]
pub struct CreateAccountRequest {
    /// Email; defaults to the email claim of the token.
    #[serde(default)]
    pub email: Option<String>,
}

/// Register the current user. Repeating the call returns the existing
/// account with `200` instead of `201`.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    body: Option<Json<CreateAccountRequest>>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let email = body.email.or(auth.email);

    let user_id = auth.user_id.clone();
    let (mut account, created) =
        run_blocking(&state.store, move |s| s.create_account(&user_id, email)).await?;

    // Create customer in Stripe if configured
    if let (Some(stripe), None) = (&state.stripe, &account.stripe_customer_id) {
        match stripe
            .create_customer(auth.user_id.as_str(), account.email.as_deref())
            .await
        {
            Ok(customer) => {
                tracing::info!(
                    user_id = %auth.user_id,
                    stripe_id = %customer.id,
                    "Stripe customer created"
                );
                let (user_id, customer_id) = (auth.user_id.clone(), customer.id.clone());
                run_blocking(&state.store, move |s| {
                    s.set_stripe_customer(&user_id, &customer_id)
                })
                .await?;
                account.stripe_customer_id = Some(customer.id);
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %auth.user_id,
                    error = %e,
                    "Failed to create Stripe customer - continuing without"
                );
            }
        }
    }

    let status = if created {
        tracing::info!(user_id = %auth.user_id, "Account created");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(AccountResponse::from(&account))))
}

/// Get the current user's account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.balances.get_balance(&auth.user_id).await?;
    Ok(Json(AccountResponse::from(&account)))
}
