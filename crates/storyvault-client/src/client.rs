//! StoryVault HTTP client implementation.

use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

use storyvault_core::Tier;

use crate::error::ClientError;
use crate::types::{
    Account, AdjustmentResult, ApiErrorBody, ApiErrorResponse, Balance, BalanceAudit, CastVote,
    CastVoteRequest, Checkout, Contest, CreateAccountRequest, CreateSubmissionRequest,
    CreditAdjustment, Leaderboard, LedgerPage, NewContest, PurchaseCreditsRequest,
    PurchaseVotesRequest, PurgeResult, PurgeViewsRequest, Settlement, Submission,
    VerifySessionRequest, VotePurchase, Views, VotesRemaining,
};

/// StoryVault API client.
///
/// User-scoped calls take the caller's identity token; admin calls use the
/// admin key from [`ClientOptions`].
#[derive(Debug, Clone)]
pub struct StoryVaultClient {
    client: Client,
    base_url: String,
    admin_key: Option<String>,
    admin_id: Option<String>,
}

impl StoryVaultClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the service (e.g., `"http://storyvault:8080"`)
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, ClientOptions::default())
    }

    /// Create a new client with custom options.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            admin_key: options.admin_key,
            admin_id: options.admin_id,
        })
    }

    // ------------------------------------------------------------------
    // Accounts and credits
    // ------------------------------------------------------------------

    /// Create the caller's account, or return it if it exists.
    pub async fn create_account(
        &self,
        id_token: &str,
        email: Option<&str>,
    ) -> Result<Account, ClientError> {
        let request = Self::user(self.client.post(self.url("/v1/accounts")), id_token)
            .json(&CreateAccountRequest { email });
        Self::send(request).await
    }

    /// The caller's account.
    pub async fn get_account(&self, id_token: &str) -> Result<Account, ClientError> {
        let request = Self::user(self.client.get(self.url("/v1/accounts/me")), id_token);
        Self::send(request).await
    }

    /// The caller's credit balance.
    pub async fn get_balance(&self, id_token: &str) -> Result<Balance, ClientError> {
        let request = Self::user(self.client.get(self.url("/v1/credits/balance")), id_token);
        Self::send(request).await
    }

    /// A page of the caller's ledger, newest first.
    pub async fn list_ledger(
        &self,
        id_token: &str,
        limit: usize,
        offset: usize,
    ) -> Result<LedgerPage, ClientError> {
        let request = Self::user(self.client.get(self.url("/v1/credits/ledger")), id_token)
            .query(&[("limit", limit), ("offset", offset)]);
        Self::send(request).await
    }

    /// Start a checkout for `credits` credits.
    pub async fn purchase_credits(
        &self,
        id_token: &str,
        credits: i64,
    ) -> Result<Checkout, ClientError> {
        let request = Self::user(self.client.post(self.url("/v1/credits/purchase")), id_token)
            .json(&PurchaseCreditsRequest { credits });
        Self::send(request).await
    }

    /// Settle a completed checkout. Safe to repeat.
    pub async fn verify_session(
        &self,
        id_token: &str,
        session_id: &str,
    ) -> Result<Settlement, ClientError> {
        let request = Self::user(
                self.client.post(self.url("/v1/payments/verify-session")),
                id_token,
            )
            .json(&VerifySessionRequest { session_id });
        Self::send(request).await
    }

    // ------------------------------------------------------------------
    // Contests and votes
    // ------------------------------------------------------------------

    /// A contest.
    pub async fn get_contest(&self, contest_id: &str) -> Result<Contest, ClientError> {
        let request = self
            .client
            .get(self.url(&format!("/v1/contests/{contest_id}")));
        Self::send(request).await
    }

    /// Enter a story into a contest.
    pub async fn submit(
        &self,
        id_token: &str,
        contest_id: &str,
        title: &str,
        submission_id: Option<&str>,
    ) -> Result<Submission, ClientError> {
        let request = Self::user(
                self.client
                    .post(self.url(&format!("/v1/contests/{contest_id}/submissions"))),
                id_token,
            )
            .json(&CreateSubmissionRequest {
                title,
                submission_id,
            });
        Self::send(request).await
    }

    /// Ranked submissions.
    pub async fn leaderboard(
        &self,
        contest_id: &str,
        limit: usize,
    ) -> Result<Leaderboard, ClientError> {
        let request = self
            .client
            .get(self.url(&format!("/v1/contests/{contest_id}/leaderboard")))
            .query(&[("limit", limit)]);
        Self::send(request).await
    }

    /// Votes the caller has left.
    pub async fn votes_remaining(
        &self,
        id_token: &str,
        contest_id: &str,
    ) -> Result<VotesRemaining, ClientError> {
        let request = Self::user(
            self.client
                .get(self.url(&format!("/v1/contests/{contest_id}/votes/remaining"))),
            id_token,
        );
        Self::send(request).await
    }

    /// Cast a vote.
    pub async fn cast_vote(
        &self,
        id_token: &str,
        contest_id: &str,
        submission_id: &str,
        tier: Tier,
    ) -> Result<CastVote, ClientError> {
        let request = Self::user(
                self.client
                    .post(self.url(&format!("/v1/contests/{contest_id}/votes"))),
                id_token,
            )
            .json(&CastVoteRequest {
                submission_id,
                tier,
            });
        Self::send(request).await
    }

    /// Buy paid votes with credits. Passing an idempotency key makes retries
    /// safe.
    pub async fn purchase_votes(
        &self,
        id_token: &str,
        contest_id: &str,
        tier: Tier,
        count: u32,
        idempotency_key: Option<&str>,
    ) -> Result<VotePurchase, ClientError> {
        let request = Self::user(
                self.client
                    .post(self.url(&format!("/v1/contests/{contest_id}/votes/purchase"))),
                id_token,
            )
            .json(&PurchaseVotesRequest {
                tier,
                count,
                idempotency_key,
            });
        Self::send(request).await
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Record a view, as the token's user when one is given.
    pub async fn record_view(
        &self,
        id_token: Option<&str>,
        content_id: &str,
    ) -> Result<Views, ClientError> {
        let mut request = self
            .client
            .post(self.url(&format!("/v1/content/{content_id}/views")));
        if let Some(token) = id_token {
            request = Self::user(request, token);
        }
        Self::send(request).await
    }

    /// Current view count.
    pub async fn get_views(&self, content_id: &str) -> Result<Views, ClientError> {
        let request = self
            .client
            .get(self.url(&format!("/v1/content/{content_id}/views")));
        Self::send(request).await
    }

    // ------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------

    /// Grant or correct a user's credits.
    pub async fn adjust_credits(
        &self,
        adjustment: &CreditAdjustment,
    ) -> Result<AdjustmentResult, ClientError> {
        let request = self
            .admin(self.client.post(self.url("/v1/admin/credits")))?
            .json(adjustment);
        Self::send(request).await
    }

    /// Create a contest.
    pub async fn create_contest(&self, contest: &NewContest) -> Result<Contest, ClientError> {
        let request = self
            .admin(self.client.post(self.url("/v1/admin/contests")))?
            .json(contest);
        Self::send(request).await
    }

    /// Compare a user's cached balance with the ledger.
    pub async fn audit_account(&self, user_id: &str) -> Result<BalanceAudit, ClientError> {
        let request = self.admin(
            self.client
                .get(self.url(&format!("/v1/admin/accounts/{user_id}/audit"))),
        )?;
        Self::send(request).await
    }

    /// Delete view fingerprints of days before `before`.
    pub async fn purge_views(&self, before: NaiveDate) -> Result<PurgeResult, ClientError> {
        let request = self
            .admin(self.client.post(self.url("/v1/admin/views/purge")))?
            .json(&PurgeViewsRequest { before });
        Self::send(request).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn user(request: RequestBuilder, id_token: &str) -> RequestBuilder {
        request.bearer_auth(id_token)
    }

    fn admin(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let key = self
            .admin_key
            .as_deref()
            .ok_or_else(|| ClientError::Configuration("admin key not set".into()))?;
        let mut request = request.header("x-admin-key", key);
        if let Some(admin_id) = &self.admin_id {
            request = request.header("x-admin-id", admin_id);
        }
        Ok(request)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        let Ok(api_error) = error_body else {
            return Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            });
        };

        let ApiErrorBody {
            code,
            message,
            details,
        } = api_error.error;
        let detail = |key: &str| details.as_ref().and_then(|d| d.get(key)).cloned();

        tracing::debug!(status = %status, code = %code, message = %message, "StoryVault API error");

        // Map specific error codes to typed errors
        let tier = detail("tier").and_then(|v| serde_json::from_value::<Tier>(v).ok());
        match (code.as_str(), tier) {
            ("unauthorized", _) => Err(ClientError::Unauthorized),
            ("not_found", _) => Err(ClientError::NotFound { message }),
            ("insufficient_credits", _) => Err(ClientError::InsufficientCredits {
                balance: detail("balance")
                    .and_then(|v| v.as_i64())
                    .unwrap_or_default(),
                required: detail("required")
                    .and_then(|v| v.as_i64())
                    .unwrap_or_default(),
            }),
            ("allowance_exhausted", Some(tier)) => Err(ClientError::AllowanceExhausted { tier }),
            ("contest_not_votable", _) => Err(ClientError::ContestNotVotable { message }),
            ("payment_not_confirmed", _) => Err(ClientError::PaymentNotConfirmed {
                status: detail("status")
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default(),
            }),
            _ => Err(ClientError::Api {
                code: code.clone(),
                message,
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Key for the admin endpoints.
    pub admin_key: Option<String>,
    /// Name recorded in admin audit logs.
    pub admin_id: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            admin_key: None,
            admin_id: None,
        }
    }
}

impl ClientOptions {
    /// Options for an admin client.
    #[must_use]
    pub fn with_admin_key(key: impl Into<String>) -> Self {
        Self {
            admin_key: Some(key.into()),
            ..Self::default()
        }
    }
}
