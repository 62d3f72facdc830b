//! Balance projection.
//!
//! The account's `credit_balance` is a cache over the ledger. Reads trust it
//! only while its `last_entry_id` matches the newest entry of the user; a
//! stale or missing projection is rebuilt from the ledger and written back.

use std::sync::Arc;

use serde::Serialize;

use storyvault_core::{Account, EntryId, UserId};
use storyvault_store::{Store, StoreError};

use crate::error::ApiError;
use crate::retry::{retry_on_conflict, run_blocking, RetryPolicy};

/// Result of comparing the cached balance with the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceAudit {
    /// The audited user.
    pub user_id: String,
    /// Balance held by the projection before the audit.
    pub cached: i64,
    /// Sum of the user's ledger entries.
    pub ledger_sum: i64,
    /// Whether the projection matched the ledger.
    pub consistent: bool,
    /// Whether the projection was rewritten.
    pub repaired: bool,
}

/// Reads balances through the cached projection.
#[derive(Clone)]
pub struct BalanceProjector {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
}

impl BalanceProjector {
    /// Create a projector over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// The user's account with an up-to-date balance.
    ///
    /// Returns `NotFound` if the user has neither an account nor ledger
    /// entries.
    pub async fn get_balance(&self, user_id: &UserId) -> Result<Account, ApiError> {
        let (account, latest) = self.snapshot(user_id).await?;

        match account {
            None if latest.is_none() => Err(ApiError::NotFound(format!(
                "account not found: {user_id}"
            ))),
            Some(account) if account.last_entry_id == latest => Ok(account),
            _ => {
                tracing::debug!(user_id = %user_id, "Balance projection stale, rebuilding");
                Ok(self.rebuild(user_id).await?)
            }
        }
    }

    /// Compare the projection with the ledger and repair it if they differ.
    pub async fn audit(&self, user_id: &UserId) -> Result<BalanceAudit, ApiError> {
        let (account, latest) = self.snapshot(user_id).await?;

        if account.is_none() && latest.is_none() {
            return Err(ApiError::NotFound(format!("account not found: {user_id}")));
        }

        let id = user_id.clone();
        let ledger_sum = run_blocking(&self.store, move |s| s.sum_for_user(&id)).await?;
        let cached = account.as_ref().map_or(0, |a| a.credit_balance);
        let consistent = account
            .as_ref()
            .is_some_and(|a| a.credit_balance == ledger_sum && a.last_entry_id == latest);

        let repaired = if consistent {
            false
        } else {
            tracing::warn!(
                user_id = %user_id,
                cached = %cached,
                ledger_sum = %ledger_sum,
                "Balance projection disagrees with ledger, repairing"
            );
            self.rebuild(user_id).await?;
            true
        };

        Ok(BalanceAudit {
            user_id: user_id.to_string(),
            cached,
            ledger_sum,
            consistent,
            repaired,
        })
    }

    /// The cached account and the newest ledger entry id.
    async fn snapshot(
        &self,
        user_id: &UserId,
    ) -> Result<(Option<Account>, Option<EntryId>), StoreError> {
        let id = user_id.clone();
        run_blocking(&self.store, move |s| {
            Ok((s.get_account(&id)?, s.latest_entry_id(&id)?))
        })
        .await
    }

    async fn rebuild(&self, user_id: &UserId) -> Result<Account, StoreError> {
        retry_on_conflict(self.retry, "rebuild_balance", || {
            let id = user_id.clone();
            run_blocking(&self.store, move |s| s.rebuild_balance(&id))
        })
        .await
    }
}
