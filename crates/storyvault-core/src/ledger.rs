//! Ledger entry types for StoryVault.
//!
//! The ledger is append-only: every change to a credit balance is one entry,
//! and the sum of a user's entries is their balance.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::{ContestId, EntryId, Tier, UserId};

/// An immutable record of a balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (ULID for time-ordering).
    pub id: EntryId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Signed amount in credits. Positive = credit, negative = debit.
    pub amount: i64,

    /// Why the balance changed.
    pub reason: EntryReason,

    /// External reference (payment session, idempotency key). At most one
    /// entry exists per `(user_id, external_ref)`.
    pub external_ref: Option<String>,

    /// Balance after this entry. Filled in by the store when the entry is
    /// appended.
    pub balance_after: i64,

    /// Human-readable description.
    pub description: String,

    /// Votes bought by a `vote-cast` debit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<PurchasedVotes>,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

/// Votes paid for by a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasedVotes {
    /// Contest the votes are valid in.
    pub contest_id: ContestId,
    /// Tier bought.
    pub tier: Tier,
    /// Number of votes.
    pub count: u32,
}

impl LedgerEntry {
    /// Create a new entry after validating amount and reason.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ZeroAmount`] for a zero amount and
    /// [`LedgerError::AmountReasonMismatch`] when the sign does not fit the reason.
    pub fn new(
        user_id: UserId,
        amount: i64,
        reason: EntryReason,
        external_ref: Option<String>,
        description: String,
    ) -> Result<Self> {
        let entry = Self {
            id: EntryId::generate(),
            user_id,
            amount,
            reason,
            external_ref,
            balance_after: 0,
            description,
            votes: None,
            created_at: Utc::now(),
        };
        entry.validate()?;
        Ok(entry)
    }

    /// Credits bought through a payment session.
    ///
    /// # Errors
    ///
    /// Returns an error if `credits` is not positive.
    pub fn purchase(user_id: UserId, credits: i64, session_id: &str) -> Result<Self> {
        Self::new(
            user_id,
            credits,
            EntryReason::Purchase,
            Some(session_id.to_string()),
            format!("Purchased {credits} credits (session {session_id})"),
        )
    }

    /// Credits spent on contest votes. `credits` is the positive cost.
    ///
    /// # Errors
    ///
    /// Returns an error if `credits` is not positive.
    pub fn vote_cast(user_id: UserId, credits: i64, description: &str) -> Result<Self> {
        if credits <= 0 {
            return Err(LedgerError::AmountReasonMismatch {
                amount: credits,
                reason: EntryReason::VoteCast,
            });
        }
        Self::new(
            user_id,
            -credits,
            EntryReason::VoteCast,
            None,
            description.to_string(),
        )
    }

    /// Promotional or compensating credits granted by an administrator.
    ///
    /// # Errors
    ///
    /// Returns an error if `credits` is not positive.
    pub fn admin_grant(user_id: UserId, credits: i64, reason: &str) -> Result<Self> {
        Self::new(
            user_id,
            credits,
            EntryReason::AdminGrant,
            None,
            reason.to_string(),
        )
    }

    /// A signed balance correction made by an administrator.
    ///
    /// # Errors
    ///
    /// Returns an error if `amount` is zero.
    pub fn admin_correction(user_id: UserId, amount: i64, reason: &str) -> Result<Self> {
        Self::new(
            user_id,
            amount,
            EntryReason::AdminCorrection,
            None,
            reason.to_string(),
        )
    }

    /// Record the votes this entry pays for.
    #[must_use]
    pub fn with_votes(mut self, contest_id: ContestId, tier: Tier, count: u32) -> Self {
        self.votes = Some(PurchasedVotes {
            contest_id,
            tier,
            count,
        });
        self
    }

    /// Attach an external reference used for idempotent appends.
    #[must_use]
    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }

    /// Check the amount against the reason's sign rule.
    ///
    /// # Errors
    ///
    /// See [`LedgerEntry::new`].
    pub fn validate(&self) -> Result<()> {
        if self.amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let sign_ok = match self.reason {
            EntryReason::Purchase | EntryReason::AdminGrant => self.amount > 0,
            EntryReason::VoteCast => self.amount < 0,
            EntryReason::AdminCorrection => true,
        };
        if sign_ok {
            Ok(())
        } else {
            Err(LedgerError::AmountReasonMismatch {
                amount: self.amount,
                reason: self.reason,
            })
        }
    }

    /// Whether this entry removes credits.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        self.amount < 0
    }
}

/// Reason for a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryReason {
    /// User purchased credits.
    Purchase,

    /// Credits spent on contest votes.
    VoteCast,

    /// Credits granted by an administrator.
    AdminGrant,

    /// Signed correction by an administrator.
    AdminCorrection,
}

impl EntryReason {
    /// Wire name of the reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::VoteCast => "vote-cast",
            Self::AdminGrant => "admin-grant",
            Self::AdminCorrection => "admin-correction",
        }
    }
}

impl fmt::Display for EntryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_entry_carries_session_ref() {
        let entry = LedgerEntry::purchase(UserId::generate(), 100, "cs_test_1").unwrap();
        assert_eq!(entry.amount, 100);
        assert_eq!(entry.reason, EntryReason::Purchase);
        assert_eq!(entry.external_ref.as_deref(), Some("cs_test_1"));
    }

    #[test]
    fn vote_cast_is_negative() {
        let entry = LedgerEntry::vote_cast(UserId::generate(), 25, "1 super vote").unwrap();
        assert_eq!(entry.amount, -25);
        assert!(entry.is_debit());
    }

    #[test]
    fn zero_amount_rejected() {
        let result = LedgerEntry::admin_correction(UserId::generate(), 0, "noop");
        assert_eq!(result.unwrap_err(), LedgerError::ZeroAmount);
    }

    #[test]
    fn sign_must_match_reason() {
        assert!(matches!(
            LedgerEntry::purchase(UserId::generate(), -5, "sess"),
            Err(LedgerError::AmountReasonMismatch { .. })
        ));
        assert!(matches!(
            LedgerEntry::admin_grant(UserId::generate(), -5, "oops"),
            Err(LedgerError::AmountReasonMismatch { .. })
        ));
        assert!(matches!(
            LedgerEntry::vote_cast(UserId::generate(), 0, "free"),
            Err(LedgerError::AmountReasonMismatch { .. })
        ));
        assert!(LedgerEntry::admin_correction(UserId::generate(), -5, "refund reversal").is_ok());
    }

    #[test]
    fn reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&EntryReason::VoteCast).unwrap(),
            "\"vote-cast\""
        );
        let parsed: EntryReason = serde_json::from_str("\"admin-correction\"").unwrap();
        assert_eq!(parsed, EntryReason::AdminCorrection);
        assert_eq!(EntryReason::AdminGrant.to_string(), "admin-grant");
    }
}
