//! Error types for StoryVault storage.

use storyvault_core::{LedgerError, Tier};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Record already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of record.
        entity: &'static str,
        /// Identifier that collided.
        id: String,
    },

    /// A debit would take the balance below zero.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Credits the debit needs.
        required: i64,
    },

    /// No votes of the tier remain in the allowance.
    #[error("no {tier} votes remaining")]
    AllowanceExhausted {
        /// The exhausted tier.
        tier: Tier,
    },

    /// The transaction lost a lock race or timed out waiting for a lock.
    /// Safe to retry.
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// The entry failed domain validation.
    #[error("invalid ledger entry: {0}")]
    InvalidEntry(#[from] LedgerError),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
