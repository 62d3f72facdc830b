//! Core types for StoryVault.
//!
//! This crate provides the domain types of the credit ledger and contest voting
//! service:
//!
//! - **Identifiers**: `UserId`, `ContestId`, `SubmissionId`, `ContentId`, `EntryId`, `VoteId`
//! - **Accounts**: `Account` (cached credit balance projection)
//! - **Ledger**: `LedgerEntry`, `EntryReason`
//! - **Contests**: `Contest`, `Submission`, `Tier`, `VoteAllowance`, `VoteRecord`
//! - **Settlement**: `SettlementRecord`, `PaymentSession`, `PaymentStatus`
//! - **Views**: `ViewFingerprint`, `ContentStats`
//! - **Voting rules**: `VotingConfig`
//!
//! # Credits
//!
//! Balances are whole credits stored as `i64`. A user's balance is the sum of
//! their ledger entries and is never negative.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod contest;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod settlement;
pub mod view;
pub mod voting;

pub use account::Account;
pub use contest::{
    rank_submissions, Contest, Submission, Tier, TierCounts, VoteAllowance, VoteRecord, VoteTotals,
};
pub use error::{LedgerError, Result};
pub use ids::{ContentId, ContestId, EntryId, IdError, SubmissionId, UserId, VoteId, MAX_ID_LEN};
pub use ledger::{EntryReason, LedgerEntry, PurchasedVotes};
pub use settlement::{PaymentSession, PaymentStatus, SettlementRecord};
pub use view::{ContentStats, ViewFingerprint};
pub use voting::{parse_tier_counts, VotingConfig, MAX_VOTES_PER_PURCHASE};
