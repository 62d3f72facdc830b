//! Writing contest types: tiers, allowances, votes and submissions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::{ContestId, SubmissionId, UserId, VoteId};

/// Vote tier. Each tier carries a fixed weight multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Free vote every reader gets.
    Free,
    /// Premium vote, bought with credits.
    Premium,
    /// Super vote, bought with credits.
    Super,
}

impl Tier {
    /// All tiers, in ascending weight order.
    pub const ALL: [Self; 3] = [Self::Free, Self::Premium, Self::Super];

    /// Wire name of the tier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
            Self::Super => "super",
        }
    }

    /// Whether allowance for this tier can be bought with credits.
    #[must_use]
    pub const fn is_purchasable(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "premium" => Ok(Self::Premium),
            "super" => Ok(Self::Super),
            other => Err(LedgerError::UnknownTier(other.to_string())),
        }
    }
}

/// A per-tier counter set (`{free, premium, super}`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    /// Free-tier count.
    pub free: u32,
    /// Premium-tier count.
    pub premium: u32,
    /// Super-tier count.
    #[serde(rename = "super")]
    pub super_: u32,
}

impl TierCounts {
    /// Create a counter set.
    #[must_use]
    pub const fn new(free: u32, premium: u32, super_: u32) -> Self {
        Self {
            free,
            premium,
            super_,
        }
    }

    /// Count for a tier.
    #[must_use]
    pub const fn get(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Free => self.free,
            Tier::Premium => self.premium,
            Tier::Super => self.super_,
        }
    }

    /// Mutable count for a tier.
    pub fn get_mut(&mut self, tier: Tier) -> &mut u32 {
        match tier {
            Tier::Free => &mut self.free,
            Tier::Premium => &mut self.premium,
            Tier::Super => &mut self.super_,
        }
    }
}

/// Remaining votes per tier for one user in one contest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteAllowance {
    /// The voter.
    pub user_id: UserId,
    /// The contest.
    pub contest_id: ContestId,
    /// Remaining votes by tier.
    pub remaining: TierCounts,
    /// When the allowance was first created.
    pub created_at: DateTime<Utc>,
    /// When the allowance last changed.
    pub updated_at: DateTime<Utc>,
}

impl VoteAllowance {
    /// Create an allowance with the given starting allotment.
    #[must_use]
    pub fn new(user_id: UserId, contest_id: ContestId, allotment: TierCounts) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            contest_id,
            remaining: allotment,
            created_at: now,
            updated_at: now,
        }
    }

    /// Consume one vote of `tier`. Returns `false` when none remain.
    pub fn try_consume(&mut self, tier: Tier) -> bool {
        let slot = self.remaining.get_mut(tier);
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        self.updated_at = Utc::now();
        true
    }

    /// Add purchased votes of `tier`.
    pub fn add(&mut self, tier: Tier, count: u32) {
        let slot = self.remaining.get_mut(tier);
        *slot = slot.saturating_add(count);
        self.updated_at = Utc::now();
    }
}

/// A single admitted vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// Unique vote ID.
    pub id: VoteId,
    /// The voter.
    pub user_id: UserId,
    /// The contest voted in.
    pub contest_id: ContestId,
    /// The submission voted for.
    pub submission_id: SubmissionId,
    /// The tier spent.
    pub tier: Tier,
    /// Weight added to the submission's weighted total.
    pub weight: u32,
    /// When the vote was cast.
    pub cast_at: DateTime<Utc>,
}

impl VoteRecord {
    /// Create a vote record.
    #[must_use]
    pub fn new(
        user_id: UserId,
        contest_id: ContestId,
        submission_id: SubmissionId,
        tier: Tier,
        weight: u32,
    ) -> Self {
        Self {
            id: VoteId::generate(),
            user_id,
            contest_id,
            submission_id,
            tier,
            weight,
            cast_at: Utc::now(),
        }
    }
}

/// A writing contest with a voting window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contest {
    /// Contest ID.
    pub id: ContestId,
    /// Display title.
    pub title: String,
    /// Voting opens at this instant (inclusive).
    pub voting_opens_at: DateTime<Utc>,
    /// Voting closes at this instant (exclusive).
    pub voting_closes_at: DateTime<Utc>,
    /// When the contest was created.
    pub created_at: DateTime<Utc>,
}

impl Contest {
    /// Whether votes are accepted at `now`.
    #[must_use]
    pub fn is_votable_at(&self, now: DateTime<Utc>) -> bool {
        self.voting_opens_at <= now && now < self.voting_closes_at
    }
}

/// Aggregated vote counters of a submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTotals {
    /// Number of votes.
    pub total: u64,
    /// Sum of vote weights.
    pub weighted_total: u64,
    /// Number of votes per tier.
    pub by_tier: TierCounts,
}

impl VoteTotals {
    /// Count one vote.
    pub fn record(&mut self, tier: Tier, weight: u32) {
        self.total += 1;
        self.weighted_total += u64::from(weight);
        let slot = self.by_tier.get_mut(tier);
        *slot = slot.saturating_add(1);
    }
}

/// A story entered into a contest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Submission ID.
    pub id: SubmissionId,
    /// The contest it belongs to.
    pub contest_id: ContestId,
    /// The author.
    pub author_id: UserId,
    /// Story title.
    pub title: String,
    /// Vote counters.
    pub votes: VoteTotals,
    /// When the story was submitted.
    pub created_at: DateTime<Utc>,
}

impl Submission {
    /// Create a submission with no votes.
    #[must_use]
    pub fn new(
        id: SubmissionId,
        contest_id: ContestId,
        author_id: UserId,
        title: String,
    ) -> Self {
        Self {
            id,
            contest_id,
            author_id,
            title,
            votes: VoteTotals::default(),
            created_at: Utc::now(),
        }
    }
}

/// Order submissions for a leaderboard: weighted total, then vote count
/// (both descending), then earliest submission first.
pub fn rank_submissions(submissions: &mut [Submission]) {
    submissions.sort_by(|a, b| {
        b.votes
            .weighted_total
            .cmp(&a.votes.weighted_total)
            .then_with(|| b.votes.total.cmp(&a.votes.total))
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}
