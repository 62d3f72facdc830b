//! `RocksDB` storage layer for StoryVault.
//!
//! This crate provides persistent storage for the credit ledger, contest votes,
//! payment settlements and view counters using a transactional `RocksDB`
//! database with column families for indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `accounts`: Cached balance projections, keyed by `user_id`
//! - `ledger`: Append-only ledger entries, keyed by `entry_id` (ULID)
//! - `ledger_by_user`: Index for listing and summing a user's entries
//! - `ledger_refs`: Idempotency index on `(user_id, external_ref)`
//! - `contests`, `submissions`: Contests and their per-submission vote tallies
//! - `allowances`, `votes`: Per-user vote allowances and cast votes
//! - `settlements`: Payment session settlement records
//! - `view_fingerprints`, `content_stats`: Daily view de-duplication
//!
//! # Concurrency
//!
//! Every read-check-write sequence runs in a pessimistic transaction that
//! locks the rows it reads. A transaction that cannot take its locks within the
//! configured timeout fails with [`StoreError::Conflict`] and writes nothing.
//!
//! # Example
//!
//! ```no_run
//! use storyvault_store::{RocksStore, Store};
//! use storyvault_core::{LedgerEntry, UserId};
//!
//! let store = RocksStore::open("/tmp/storyvault-db").unwrap();
//!
//! let user_id = UserId::new("user-1").unwrap();
//! let grant = LedgerEntry::admin_grant(user_id.clone(), 50, "welcome").unwrap();
//! let outcome = store.append_entry(grant).unwrap();
//! assert_eq!(outcome.balance, 50);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::{RocksStore, DEFAULT_LOCK_TIMEOUT_MS};

use chrono::NaiveDate;
use storyvault_core::{
    Account, ContentId, ContentStats, Contest, ContestId, EntryId, LedgerEntry, SettlementRecord,
    Submission, SubmissionId, Tier, TierCounts, UserId, ViewFingerprint, VoteAllowance,
    VoteRecord, VoteTotals,
};

/// Result of appending a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    /// The stored entry. On replay this is the entry recorded the first time.
    pub entry: LedgerEntry,
    /// Account balance after the call.
    pub balance: i64,
    /// `false` if the external reference had already been applied.
    pub applied: bool,
}

/// Result of casting a vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastOutcome {
    /// The stored vote.
    pub vote: VoteRecord,
    /// Allowance left after the vote.
    pub remaining: TierCounts,
    /// Submission tally after the vote.
    pub totals: VoteTotals,
}

/// Result of buying votes with credits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOutcome {
    /// The `vote-cast` debit entry.
    pub entry: LedgerEntry,
    /// Account balance after the call.
    pub balance: i64,
    /// Allowance after the call.
    pub remaining: TierCounts,
    /// `false` if the idempotency key had already been applied.
    pub applied: bool,
}

/// Result of settling a payment session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleOutcome {
    /// The settlement record, new or pre-existing.
    pub record: SettlementRecord,
    /// `false` if the session had already been settled.
    pub applied: bool,
}

/// Result of recording a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewOutcome {
    /// `true` if this is the first view from the client today.
    pub counted: bool,
    /// Total distinct views of the content.
    pub views: u64,
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing). Every mutating method is atomic:
/// either all of its writes land or none do.
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// Create an account, or return the existing one.
    ///
    /// An existing account keeps its balance; a missing email is filled in.
    /// The flag is `true` if the account was created.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_account(&self, user_id: &UserId, email: Option<String>) -> Result<(Account, bool)>;

    /// Record the payment processor customer id of an account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn set_stripe_customer(&self, user_id: &UserId, customer_id: &str) -> Result<()>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Append a ledger entry and update the account projection atomically.
    ///
    /// The account is created on first use. `balance_after` is filled in by
    /// the store. If the entry carries an `external_ref` already recorded for
    /// the user, nothing is written and the original entry is returned.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidEntry` if the entry violates the sign rules.
    /// - `StoreError::InsufficientCredits` if the balance would go negative.
    /// - `StoreError::Conflict` if row locks could not be taken.
    fn append_entry(&self, entry: LedgerEntry) -> Result<AppendOutcome>;

    /// Get a ledger entry by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_entry(&self, entry_id: &EntryId) -> Result<Option<LedgerEntry>>;

    /// Find the entry recorded for a user's external reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_entry_by_ref(&self, user_id: &UserId, external_ref: &str)
        -> Result<Option<LedgerEntry>>;

    /// List entries for a user, ordered by time (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_entries_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;

    /// Sum of all entry amounts of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn sum_for_user(&self, user_id: &UserId) -> Result<i64>;

    /// ID of the newest entry of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn latest_entry_id(&self, user_id: &UserId) -> Result<Option<EntryId>>;

    /// Recompute the account projection from the ledger and store it.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the user has neither account nor entries.
    /// - `StoreError::Conflict` if the account lock could not be taken.
    fn rebuild_balance(&self, user_id: &UserId) -> Result<Account>;

    // =========================================================================
    // Contest Operations
    // =========================================================================

    /// Insert or update a contest.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_contest(&self, contest: &Contest) -> Result<()>;

    /// Get a contest by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_contest(&self, contest_id: &ContestId) -> Result<Option<Contest>>;

    /// Insert a new submission with an empty tally.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the submission exists.
    fn create_submission(&self, submission: &Submission) -> Result<()>;

    /// Get a submission by contest and ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_submission(
        &self,
        contest_id: &ContestId,
        submission_id: &SubmissionId,
    ) -> Result<Option<Submission>>;

    /// List all submissions of a contest.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_submissions(&self, contest_id: &ContestId) -> Result<Vec<Submission>>;

    // =========================================================================
    // Voting Operations
    // =========================================================================

    /// Get the allowance of a user in a contest, creating it with `allotment`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_or_create_allowance(
        &self,
        user_id: &UserId,
        contest_id: &ContestId,
        allotment: TierCounts,
    ) -> Result<VoteAllowance>;

    /// Cast a vote: decrement the allowance, store the vote and bump the
    /// submission tally in one transaction.
    ///
    /// # Errors
    ///
    /// - `StoreError::AllowanceExhausted` if no votes of the tier remain.
    /// - `StoreError::NotFound` if the submission doesn't exist.
    /// - `StoreError::Conflict` if row locks could not be taken.
    fn cast_vote(&self, vote: &VoteRecord, allotment: TierCounts) -> Result<CastOutcome>;

    /// Buy `count` votes of `tier`: append the debit `entry` and add the votes
    /// to the allowance in one transaction.
    ///
    /// # Errors
    ///
    /// - `StoreError::InsufficientCredits` if the balance can't cover the debit.
    /// - `StoreError::Conflict` if row locks could not be taken.
    fn purchase_votes(
        &self,
        contest_id: &ContestId,
        tier: Tier,
        count: u32,
        allotment: TierCounts,
        entry: LedgerEntry,
    ) -> Result<PurchaseOutcome>;

    // =========================================================================
    // Settlement Operations
    // =========================================================================

    /// Get the settlement record of a payment session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_settlement(&self, session_id: &str) -> Result<Option<SettlementRecord>>;

    /// Apply a purchase `entry` for a payment session exactly once.
    ///
    /// If the session is already settled the existing record is returned and
    /// nothing is written.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidEntry` if the entry is not a valid credit.
    /// - `StoreError::Conflict` if row locks could not be taken.
    fn settle_payment(&self, session_id: &str, entry: LedgerEntry) -> Result<SettleOutcome>;

    // =========================================================================
    // View Operations
    // =========================================================================

    /// Count a view unless its fingerprint was already recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn record_view(&self, fingerprint: &ViewFingerprint) -> Result<ViewOutcome>;

    /// Get the view counter of a piece of content.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_content_stats(&self, content_id: &ContentId) -> Result<Option<ContentStats>>;

    /// Delete fingerprints of days strictly before `day`. Returns how many
    /// were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn purge_fingerprints_before(&self, day: NaiveDate) -> Result<usize>;
}
