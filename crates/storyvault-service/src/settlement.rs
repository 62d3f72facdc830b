//! Payment settlement.
//!
//! Converts a paid payment session into credits exactly once. The settlement
//! record and the purchase entry are written by one store transaction that
//! re-checks the record under lock, so the client-driven verification and the
//! processor webhook can race on the same session safely.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use storyvault_core::{LedgerEntry, PaymentSession, PaymentStatus, SettlementRecord, UserId};
use storyvault_store::Store;

use crate::auth::AliasResolver;
use crate::error::ApiError;
use crate::retry::{retry_on_conflict, run_blocking, RetryPolicy};

/// Errors from the payment processor.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// The processor does not know the session.
    #[error("payment session not found: {0}")]
    SessionNotFound(String),

    /// The processor could not be reached or answered with an error.
    #[error("payment processor unavailable: {0}")]
    Unavailable(String),
}

/// Looks up payment sessions at the payment processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Fetch the current state of a session.
    async fn fetch_session(&self, session_id: &str) -> Result<PaymentSession, PaymentError>;
}

/// Outcome of a settlement request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settlement {
    /// The payment session.
    pub session_id: String,
    /// `false` if the session had already been settled.
    pub applied: bool,
    /// Credits the session is worth.
    pub credits: i64,
    /// The user's balance after the call.
    pub new_balance: i64,
    /// The ledger entry that applied the credits.
    pub entry_id: String,
}

/// Applies credits for payment sessions exactly once.
#[derive(Clone)]
pub struct PaymentReconciler {
    store: Arc<dyn Store>,
    processor: Option<Arc<dyn PaymentProcessor>>,
    aliases: Arc<AliasResolver>,
    timeout: Duration,
    cents_per_credit: i64,
    retry: RetryPolicy,
}

impl PaymentReconciler {
    /// Create a reconciler. Without a processor only already-settled sessions
    /// and signed webhook events can be handled.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        processor: Option<Arc<dyn PaymentProcessor>>,
        aliases: Arc<AliasResolver>,
        timeout: Duration,
        cents_per_credit: i64,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            processor,
            aliases,
            timeout,
            cents_per_credit: cents_per_credit.max(1),
            retry,
        }
    }

    /// The configured payment processor.
    #[must_use]
    pub fn processor(&self) -> Option<Arc<dyn PaymentProcessor>> {
        self.processor.clone()
    }

    /// Settle `session_id` for `credits` credits once the processor reports
    /// it as paid.
    pub async fn settle(
        &self,
        user_id: &UserId,
        session_id: &str,
        credits: i64,
    ) -> Result<Settlement, ApiError> {
        if credits <= 0 {
            return Err(ApiError::BadRequest("credits must be positive".into()));
        }
        if let Some(done) = self.already_settled(user_id, session_id).await? {
            return Ok(done);
        }

        let session = self.fetch_session(session_id).await?;
        self.check_session(user_id, &session)?;
        self.apply(user_id, session_id, credits).await
    }

    /// Settle a checkout session for the credits recorded in it.
    pub async fn settle_checkout(
        &self,
        user_id: &UserId,
        session_id: &str,
    ) -> Result<Settlement, ApiError> {
        if let Some(done) = self.already_settled(user_id, session_id).await? {
            return Ok(done);
        }

        let session = self.fetch_session(session_id).await?;
        self.check_session(user_id, &session)?;
        let credits = self.credits_for(&session)?;
        self.apply(user_id, session_id, credits).await
    }

    /// Settle a session whose state arrived in a verified processor event.
    pub async fn settle_session(
        &self,
        user_id: &UserId,
        session: &PaymentSession,
    ) -> Result<Settlement, ApiError> {
        if let Some(done) = self.already_settled(user_id, &session.session_id).await? {
            return Ok(done);
        }

        self.check_session(user_id, session)?;
        let credits = self.credits_for(session)?;
        self.apply(user_id, &session.session_id, credits).await
    }

    /// Credits a session buys: the checkout metadata, else the amount paid.
    pub fn credits_for(&self, session: &PaymentSession) -> Result<i64, ApiError> {
        let credits = session
            .credits_amount
            .or_else(|| session.amount_total.map(|cents| cents / self.cents_per_credit))
            .unwrap_or(0);

        if credits <= 0 {
            return Err(ApiError::BadRequest(format!(
                "payment session {} carries no credit amount",
                session.session_id
            )));
        }
        Ok(credits)
    }

    async fn already_settled(
        &self,
        user_id: &UserId,
        session_id: &str,
    ) -> Result<Option<Settlement>, ApiError> {
        let id = session_id.to_string();
        let Some(record) = run_blocking(&self.store, move |s| s.get_settlement(&id)).await? else {
            return Ok(None);
        };
        self.replayed(user_id, &record).await.map(Some)
    }

    async fn replayed(
        &self,
        user_id: &UserId,
        record: &SettlementRecord,
    ) -> Result<Settlement, ApiError> {
        if record.user_id != *user_id {
            return Err(ApiError::Forbidden(format!(
                "payment session {} belongs to another user",
                record.session_id
            )));
        }

        let id = user_id.clone();
        let new_balance = run_blocking(&self.store, move |s| s.get_account(&id))
            .await?
            .map_or(record.balance_after, |a| a.credit_balance);

        tracing::debug!(
            user_id = %user_id,
            session_id = %record.session_id,
            "Payment session already settled"
        );

        Ok(Settlement {
            session_id: record.session_id.clone(),
            applied: false,
            credits: record.credits,
            new_balance,
            entry_id: record.entry_id.to_string(),
        })
    }

    async fn fetch_session(&self, session_id: &str) -> Result<PaymentSession, ApiError> {
        let processor = self
            .processor
            .as_ref()
            .ok_or_else(|| ApiError::ExternalService("payment processor not configured".into()))?;

        match tokio::time::timeout(self.timeout, processor.fetch_session(session_id)).await {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(PaymentError::SessionNotFound(id))) => {
                Err(ApiError::NotFound(format!("payment session not found: {id}")))
            }
            Ok(Err(PaymentError::Unavailable(reason))) => {
                tracing::error!(session_id = %session_id, error = %reason, "Payment processor error");
                Err(ApiError::ExternalService(
                    "payment processor unavailable".into(),
                ))
            }
            Err(_) => {
                tracing::error!(session_id = %session_id, "Payment processor timed out");
                Err(ApiError::ExternalService(
                    "payment processor timed out".into(),
                ))
            }
        }
    }

    /// The session must be paid and, when it names a user, name this one.
    fn check_session(&self, user_id: &UserId, session: &PaymentSession) -> Result<(), ApiError> {
        if session.status != PaymentStatus::Paid {
            tracing::info!(
                user_id = %user_id,
                session_id = %session.session_id,
                status = %session.status,
                "Payment not confirmed"
            );
            return Err(ApiError::PaymentNotConfirmed {
                status: session.status,
            });
        }

        if let Some(reference) = session.client_reference_id.as_deref() {
            if self.aliases.resolve(reference) != user_id.as_str() {
                tracing::warn!(
                    user_id = %user_id,
                    session_id = %session.session_id,
                    "Payment session belongs to another user"
                );
                return Err(ApiError::Forbidden(format!(
                    "payment session {} belongs to another user",
                    session.session_id
                )));
            }
        }
        Ok(())
    }

    async fn apply(
        &self,
        user_id: &UserId,
        session_id: &str,
        credits: i64,
    ) -> Result<Settlement, ApiError> {
        let entry = LedgerEntry::purchase(user_id.clone(), credits, session_id)?;

        let outcome = retry_on_conflict(self.retry, "settle_payment", || {
            let (id, entry) = (session_id.to_string(), entry.clone());
            run_blocking(&self.store, move |s| s.settle_payment(&id, entry))
        })
        .await?;

        if !outcome.applied {
            return self.replayed(user_id, &outcome.record).await;
        }

        tracing::info!(
            user_id = %user_id,
            session_id = %session_id,
            credits = %credits,
            new_balance = %outcome.record.balance_after,
            entry_id = %outcome.record.entry_id,
            "Payment settled"
        );

        Ok(Settlement {
            session_id: session_id.to_string(),
            applied: true,
            credits: outcome.record.credits,
            new_balance: outcome.record.balance_after,
            entry_id: outcome.record.entry_id.to_string(),
        })
    }
}
