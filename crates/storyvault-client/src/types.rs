//! Request and response types for the StoryVault client.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use storyvault_core::{EntryReason, Tier, TierCounts, VoteTotals};

/// A user account.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    /// User ID.
    pub user_id: String,
    /// Email, if known.
    pub email: Option<String>,
    /// Current credit balance.
    pub credit_balance: i64,
    /// Credits bought, all time.
    pub lifetime_purchased: i64,
    /// Credits granted by administrators, all time.
    pub lifetime_granted: i64,
    /// Credits spent, all time.
    pub lifetime_spent: i64,
    /// Whether a payment customer exists for the account.
    pub payment_customer_linked: bool,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
    /// Updated timestamp.
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateAccountRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<&'a str>,
}

/// Credit balance.
#[derive(Debug, Clone, Deserialize)]
pub struct Balance {
    /// User ID.
    pub user_id: String,
    /// Current balance in credits.
    pub credit_balance: i64,
    /// Ledger entry the balance reflects.
    pub last_entry_id: Option<String>,
}

/// A ledger entry.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerEntry {
    /// Entry ID.
    pub id: String,
    /// Signed amount in credits.
    pub amount: i64,
    /// Why the balance changed.
    pub reason: EntryReason,
    /// Idempotency reference, if any.
    pub external_ref: Option<String>,
    /// Balance right after this entry.
    pub balance_after: i64,
    /// Human readable description.
    pub description: String,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}

/// One page of ledger entries, newest first.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerPage {
    /// Entries.
    pub entries: Vec<LedgerEntry>,
    /// Whether older entries exist.
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct PurchaseCreditsRequest {
    pub credits: i64,
}

/// A started credit checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct Checkout {
    /// Where to send the user to pay.
    pub checkout_url: String,
    /// Session ID to verify afterwards.
    pub session_id: String,
    /// Amount charged, in cents.
    pub amount_cents: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct VerifySessionRequest<'a> {
    pub session_id: &'a str,
}

/// Result of settling a payment session.
#[derive(Debug, Clone, Deserialize)]
pub struct Settlement {
    /// Payment session ID.
    pub session_id: String,
    /// `false` if the session had been settled before.
    pub applied: bool,
    /// Credits the session is worth.
    pub credits: i64,
    /// Balance after the call.
    pub new_balance: i64,
    /// Ledger entry that applied the credits.
    pub entry_id: String,
}

/// A contest.
#[derive(Debug, Clone, Deserialize)]
pub struct Contest {
    /// Contest ID.
    pub id: String,
    /// Title.
    pub title: String,
    /// Voting window start.
    pub voting_opens_at: DateTime<Utc>,
    /// Voting window end (exclusive).
    pub voting_closes_at: DateTime<Utc>,
    /// Whether votes are accepted right now.
    pub votable: bool,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateSubmissionRequest<'a> {
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<&'a str>,
}

/// A story entered into a contest.
#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    /// Submission ID.
    pub id: String,
    /// Contest ID.
    pub contest_id: String,
    /// Author.
    pub author_id: String,
    /// Story title.
    pub title: String,
    /// Vote counters.
    pub votes: VoteTotals,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}

/// A ranked submission.
#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based rank.
    pub rank: usize,
    /// The submission.
    #[serde(flatten)]
    pub submission: Submission,
}

/// Ranked submissions of a contest.
#[derive(Debug, Clone, Deserialize)]
pub struct Leaderboard {
    /// Contest ID.
    pub contest_id: String,
    /// Best first.
    pub entries: Vec<LeaderboardEntry>,
}

/// Votes left in a contest.
#[derive(Debug, Clone, Deserialize)]
pub struct VotesRemaining {
    /// Contest ID.
    pub contest_id: String,
    /// Per tier.
    pub remaining: TierCounts,
}

#[derive(Debug, Serialize)]
pub(crate) struct CastVoteRequest<'a> {
    pub submission_id: &'a str,
    pub tier: Tier,
}

/// An admitted vote.
#[derive(Debug, Clone, Deserialize)]
pub struct CastVote {
    /// Vote ID.
    pub vote_id: String,
    /// Submission voted for.
    pub submission_id: String,
    /// Tier spent.
    pub tier: Tier,
    /// Weight added.
    pub weight: u32,
    /// Votes left per tier.
    pub remaining: TierCounts,
    /// Submission counters after the vote.
    pub submission_votes: VoteTotals,
}

#[derive(Debug, Serialize)]
pub(crate) struct PurchaseVotesRequest<'a> {
    pub tier: Tier,
    pub count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<&'a str>,
}

/// Result of buying votes.
#[derive(Debug, Clone, Deserialize)]
pub struct VotePurchase {
    /// `false` if the idempotency key had been used before.
    pub applied: bool,
    /// Tier bought.
    pub tier: Tier,
    /// Votes bought.
    pub count: u32,
    /// Credits charged.
    pub credits_spent: i64,
    /// Balance after the purchase.
    pub balance: i64,
    /// Votes left per tier.
    pub remaining: TierCounts,
}

/// View count of a piece of content.
#[derive(Debug, Clone, Deserialize)]
pub struct Views {
    /// Content ID.
    pub content_id: String,
    /// Whether the request was counted; only set when recording.
    #[serde(default)]
    pub counted: Option<bool>,
    /// Distinct daily views.
    pub views: u64,
}

/// Kind of admin credit adjustment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// Positive grant.
    #[default]
    Grant,
    /// Signed correction.
    Correction,
}

/// Admin credit adjustment.
#[derive(Debug, Clone, Serialize)]
pub struct CreditAdjustment {
    /// Target user.
    pub user_id: String,
    /// Signed amount.
    pub amount: i64,
    /// Grant or correction.
    pub kind: AdjustmentKind,
    /// Recorded as the entry description.
    pub reason: String,
    /// Makes retries safe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
}

/// Result of an admin adjustment.
#[derive(Debug, Clone, Deserialize)]
pub struct AdjustmentResult {
    /// `false` if the external reference had been applied before.
    pub applied: bool,
    /// Balance after the call.
    pub balance: i64,
    /// The recorded entry.
    pub entry: LedgerEntry,
}

/// New contest.
#[derive(Debug, Clone, Serialize)]
pub struct NewContest {
    /// Contest ID; generated by the server when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contest_id: Option<String>,
    /// Title.
    pub title: String,
    /// Voting window start.
    pub voting_opens_at: DateTime<Utc>,
    /// Voting window end (exclusive).
    pub voting_closes_at: DateTime<Utc>,
}

/// Balance audit report.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceAudit {
    /// User ID.
    pub user_id: String,
    /// Balance the account row held.
    pub cached: i64,
    /// Sum of the ledger.
    pub ledger_sum: i64,
    /// Whether they agreed.
    pub consistent: bool,
    /// Whether the account was rebuilt.
    pub repaired: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct PurgeViewsRequest {
    pub before: NaiveDate,
}

/// Result of a fingerprint purge.
#[derive(Debug, Clone, Deserialize)]
pub struct PurgeResult {
    /// Cut-off day.
    pub before: NaiveDate,
    /// Fingerprints removed.
    pub removed: usize,
}

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    pub details: Option<serde_json::Value>,
}
