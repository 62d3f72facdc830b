//! Voting configuration: tier weights, default allotment and vote prices.

use serde::{Deserialize, Serialize};

use crate::contest::{Tier, TierCounts};
use crate::error::{LedgerError, Result};

/// Largest number of votes that can be bought in one purchase.
pub const MAX_VOTES_PER_PURCHASE: u32 = 100;

/// Voting rules shared by every contest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingConfig {
    /// Weight each tier adds to a submission's weighted total.
    pub weights: TierCounts,

    /// Allotment a user starts with in each contest.
    pub default_allowance: TierCounts,

    /// Credits charged per purchased vote, by tier. Free votes are never sold.
    pub prices: TierCounts,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            weights: TierCounts::new(1, 2, 3),
            default_allowance: TierCounts::new(1, 0, 0),
            prices: TierCounts::new(0, 10, 25),
        }
    }
}

impl VotingConfig {
    /// Weight of a vote of `tier`.
    #[must_use]
    pub const fn weight(&self, tier: Tier) -> u32 {
        self.weights.get(tier)
    }

    /// Credits charged for `count` votes of `tier`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::TierNotPurchasable`] for the free tier or a tier priced at zero.
    /// - [`LedgerError::InvalidVoteCount`] when `count` is outside `1..=MAX_VOTES_PER_PURCHASE`.
    pub fn purchase_cost(&self, tier: Tier, count: u32) -> Result<i64> {
        if !tier.is_purchasable() || self.prices.get(tier) == 0 {
            return Err(LedgerError::TierNotPurchasable(tier));
        }
        if count == 0 || count > MAX_VOTES_PER_PURCHASE {
            return Err(LedgerError::InvalidVoteCount(count));
        }
        i64::from(self.prices.get(tier))
            .checked_mul(i64::from(count))
            .ok_or(LedgerError::Overflow)
    }
}

/// Parse a `free,premium,super` triple such as `"1,2,3"`.
///
/// # Errors
///
/// Returns [`LedgerError::Configuration`] if the value is not three unsigned integers.
pub fn parse_tier_counts(value: &str) -> Result<TierCounts> {
    let parts: Vec<u32> = value
        .split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| LedgerError::Configuration(format!("invalid tier triple {value:?}: {e}")))?;

    match parts.as_slice() {
        [free, premium, super_] => Ok(TierCounts::new(*free, *premium, *super_)),
        _ => Err(LedgerError::Configuration(format!(
            "expected free,premium,super but got {value:?}"
        ))),
    }
}
