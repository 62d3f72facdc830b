//! Account types for StoryVault.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::{EntryReason, LedgerEntry};
use crate::{EntryId, UserId};

/// A user's credit account.
///
/// `credit_balance` is a cached projection of the user's ledger. It is only
/// written inside the same store transaction as the ledger entry that changes
/// it, and `last_entry_id` records which entry the cache reflects so readers
/// can detect a stale projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The user ID (from the identity provider).
    pub user_id: UserId,

    /// Email from the identity token, if known.
    pub email: Option<String>,

    /// Current credit balance. Never negative.
    pub credit_balance: i64,

    /// Lifetime credits purchased.
    pub lifetime_purchased: i64,

    /// Lifetime credits granted by administrators.
    pub lifetime_granted: i64,

    /// Lifetime credits spent on votes.
    pub lifetime_spent: i64,

    /// Stripe customer ID for payments.
    pub stripe_customer_id: Option<String>,

    /// The newest ledger entry reflected in `credit_balance`.
    pub last_entry_id: Option<EntryId>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            email: None,
            credit_balance: 0,
            lifetime_purchased: 0,
            lifetime_granted: 0,
            lifetime_spent: 0,
            stripe_customer_id: None,
            last_entry_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account can cover a debit of `amount` credits.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount: i64) -> bool {
        self.credit_balance >= amount
    }

    /// Apply a ledger entry to the cached projection.
    ///
    /// Callers must have validated that the resulting balance is non-negative.
    pub fn apply_entry(&mut self, entry: &LedgerEntry) {
        self.credit_balance += entry.amount;
        match entry.reason {
            EntryReason::Purchase => self.lifetime_purchased += entry.amount,
            EntryReason::AdminGrant => self.lifetime_granted += entry.amount,
            EntryReason::VoteCast => self.lifetime_spent += entry.amount.abs(),
            EntryReason::AdminCorrection => {}
        }
        self.last_entry_id = Some(entry.id);
        self.updated_at = Utc::now();
    }
}
