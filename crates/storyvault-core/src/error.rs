//! Error types for StoryVault domain validation.

use crate::contest::Tier;
use crate::ids::IdError;
use crate::ledger::EntryReason;

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors raised by domain validation before anything touches storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Ledger entries must move the balance.
    #[error("ledger entry amount must not be zero")]
    ZeroAmount,

    /// The amount sign does not match the entry reason.
    #[error("amount {amount} is not valid for reason {reason}")]
    AmountReasonMismatch {
        /// The offending amount.
        amount: i64,
        /// The entry reason.
        reason: EntryReason,
    },

    /// The vote tier cannot be purchased.
    #[error("votes of tier {0} cannot be purchased")]
    TierNotPurchasable(Tier),

    /// Vote purchase count out of range.
    #[error("invalid vote count: {0}")]
    InvalidVoteCount(u32),

    /// Unknown vote tier name.
    #[error("unknown vote tier: {0}")]
    UnknownTier(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Arithmetic overflow while computing an amount.
    #[error("amount overflow")]
    Overflow,

    /// Configuration value could not be parsed.
    #[error("configuration error: {0}")]
    Configuration(String),
}
