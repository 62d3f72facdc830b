//! Vote admission.
//!
//! Decides whether a vote may be cast and applies it. The allowance
//! decrement, vote record and submission tally are written by one store
//! transaction that locks the allowance row, so concurrent votes of one user
//! in one contest serialize and the allowance never goes negative.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use storyvault_core::{
    rank_submissions, Contest, ContestId, LedgerEntry, Submission, SubmissionId, Tier, TierCounts,
    UserId, VoteRecord, VotingConfig,
};
use storyvault_store::{CastOutcome, PurchaseOutcome, Store, StoreError};

use crate::error::ApiError;
use crate::retry::{retry_on_conflict, run_blocking, RetryPolicy};

/// Largest leaderboard page.
pub const MAX_LEADERBOARD_LIMIT: usize = 100;

/// Vote admission controller.
#[derive(Clone)]
pub struct VoteAdmission {
    store: Arc<dyn Store>,
    config: VotingConfig,
    retry: RetryPolicy,
}

impl VoteAdmission {
    /// Create a controller with the given voting rules.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: VotingConfig, retry: RetryPolicy) -> Self {
        Self {
            store,
            config,
            retry,
        }
    }

    /// The voting rules in force.
    #[must_use]
    pub fn config(&self) -> &VotingConfig {
        &self.config
    }

    /// Load a contest or fail with `NotFound`.
    pub async fn contest(&self, contest_id: &ContestId) -> Result<Contest, ApiError> {
        let id = contest_id.clone();
        run_blocking(&self.store, move |s| s.get_contest(&id))
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("contest not found: {contest_id}")))
    }

    async fn votable_contest(&self, contest_id: &ContestId) -> Result<Contest, ApiError> {
        let contest = self.contest(contest_id).await?;
        if !contest.is_votable_at(Utc::now()) {
            return Err(ApiError::ContestNotVotable(format!(
                "voting for contest {contest_id} runs from {} to {}",
                contest.voting_opens_at.to_rfc3339(),
                contest.voting_closes_at.to_rfc3339()
            )));
        }
        Ok(contest)
    }

    /// Create a contest.
    ///
    /// Fails with `Conflict` if the id is taken and `BadRequest` if the window
    /// is empty.
    pub async fn create_contest(
        &self,
        contest_id: Option<ContestId>,
        title: &str,
        voting_opens_at: DateTime<Utc>,
        voting_closes_at: DateTime<Utc>,
    ) -> Result<Contest, ApiError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ApiError::BadRequest("title must not be empty".into()));
        }
        if voting_closes_at <= voting_opens_at {
            return Err(ApiError::BadRequest(
                "voting_closes_at must be after voting_opens_at".into(),
            ));
        }

        let id = contest_id.unwrap_or_else(ContestId::generate);
        let lookup = id.clone();
        if run_blocking(&self.store, move |s| s.get_contest(&lookup))
            .await?
            .is_some()
        {
            return Err(ApiError::Conflict(format!("contest already exists: {id}")));
        }

        let contest = Contest {
            id,
            title: title.to_string(),
            voting_opens_at,
            voting_closes_at,
            created_at: Utc::now(),
        };
        let stored = contest.clone();
        run_blocking(&self.store, move |s| s.put_contest(&stored)).await?;

        tracing::info!(contest_id = %contest.id, "Contest created");
        Ok(contest)
    }

    /// Enter a story into a contest that has not closed yet.
    pub async fn submit(
        &self,
        contest_id: &ContestId,
        author_id: UserId,
        submission_id: Option<SubmissionId>,
        title: &str,
    ) -> Result<Submission, ApiError> {
        let contest = self.contest(contest_id).await?;
        if Utc::now() >= contest.voting_closes_at {
            return Err(ApiError::ContestNotVotable(format!(
                "contest {contest_id} has closed"
            )));
        }

        let title = title.trim();
        if title.is_empty() {
            return Err(ApiError::BadRequest("title must not be empty".into()));
        }

        let submission = Submission::new(
            submission_id.unwrap_or_else(SubmissionId::generate),
            contest_id.clone(),
            author_id,
            title.to_string(),
        );
        let stored = submission.clone();
        run_blocking(&self.store, move |s| s.create_submission(&stored)).await?;

        tracing::info!(
            contest_id = %contest_id,
            submission_id = %submission.id,
            author_id = %submission.author_id,
            "Submission created"
        );
        Ok(submission)
    }

    /// Cast one vote of `tier` for a submission.
    ///
    /// Errors: `NotFound` (contest or submission), `ContestNotVotable`,
    /// `AllowanceExhausted`, and `StorageConflict` once retries are used up.
    pub async fn cast_vote(
        &self,
        user_id: &UserId,
        contest_id: &ContestId,
        submission_id: &SubmissionId,
        tier: Tier,
    ) -> Result<CastOutcome, ApiError> {
        self.votable_contest(contest_id).await?;

        let (contest, submission) = (contest_id.clone(), submission_id.clone());
        if run_blocking(&self.store, move |s| s.get_submission(&contest, &submission))
            .await?
            .is_none()
        {
            return Err(ApiError::NotFound(format!(
                "submission not found: {submission_id}"
            )));
        }

        let vote = VoteRecord::new(
            user_id.clone(),
            contest_id.clone(),
            submission_id.clone(),
            tier,
            self.config.weight(tier),
        );

        let allotment = self.config.default_allowance;
        let result = retry_on_conflict(self.retry, "cast_vote", || {
            let vote = vote.clone();
            run_blocking(&self.store, move |s| s.cast_vote(&vote, allotment))
        })
        .await;

        match result {
            Ok(outcome) => {
                tracing::info!(
                    user_id = %user_id,
                    contest_id = %contest_id,
                    submission_id = %submission_id,
                    tier = %tier,
                    weight = %vote.weight,
                    "Vote cast"
                );
                Ok(outcome)
            }
            Err(StoreError::AllowanceExhausted { tier }) => {
                tracing::debug!(
                    user_id = %user_id,
                    contest_id = %contest_id,
                    tier = %tier,
                    "Vote rejected, allowance exhausted"
                );
                Err(ApiError::AllowanceExhausted { tier })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Votes the user has left in a contest, creating the allowance with the
    /// default allotment on first use.
    pub async fn votes_remaining(
        &self,
        user_id: &UserId,
        contest_id: &ContestId,
    ) -> Result<TierCounts, ApiError> {
        self.contest(contest_id).await?;

        let allotment = self.config.default_allowance;
        let allowance = retry_on_conflict(self.retry, "get_or_create_allowance", || {
            let (user, contest) = (user_id.clone(), contest_id.clone());
            run_blocking(&self.store, move |s| {
                s.get_or_create_allowance(&user, &contest, allotment)
            })
        })
        .await?;

        Ok(allowance.remaining)
    }

    /// Buy `count` paid votes of `tier` with credits.
    ///
    /// With an `idempotency_key`, a repeated request returns the current
    /// allowance without charging again.
    pub async fn purchase_votes(
        &self,
        user_id: &UserId,
        contest_id: &ContestId,
        tier: Tier,
        count: u32,
        idempotency_key: Option<&str>,
    ) -> Result<PurchaseOutcome, ApiError> {
        self.votable_contest(contest_id).await?;

        let cost = self.config.purchase_cost(tier, count)?;
        let mut entry = LedgerEntry::vote_cast(
            user_id.clone(),
            cost,
            &format!("{count} {tier} votes in contest {contest_id}"),
        )?
        .with_votes(contest_id.clone(), tier, count);
        if let Some(key) = idempotency_key.map(str::trim).filter(|k| !k.is_empty()) {
            entry = entry.with_external_ref(purchase_ref(contest_id, key));
        }

        let allotment = self.config.default_allowance;
        let outcome = retry_on_conflict(self.retry, "purchase_votes", || {
            let (contest, entry) = (contest_id.clone(), entry.clone());
            run_blocking(&self.store, move |s| {
                s.purchase_votes(&contest, tier, count, allotment, entry)
            })
        })
        .await?;

        if outcome.applied {
            tracing::info!(
                user_id = %user_id,
                contest_id = %contest_id,
                tier = %tier,
                count = %count,
                cost = %cost,
                balance = %outcome.balance,
                "Votes purchased"
            );
        } else {
            tracing::info!(
                user_id = %user_id,
                contest_id = %contest_id,
                "Vote purchase replayed, not charged again"
            );
        }

        Ok(outcome)
    }

    /// Submissions of a contest in ranking order.
    pub async fn leaderboard(
        &self,
        contest_id: &ContestId,
        limit: usize,
    ) -> Result<Vec<Submission>, ApiError> {
        self.contest(contest_id).await?;

        let id = contest_id.clone();
        let mut submissions = run_blocking(&self.store, move |s| s.list_submissions(&id)).await?;
        rank_submissions(&mut submissions);
        submissions.truncate(limit.clamp(1, MAX_LEADERBOARD_LIMIT));
        Ok(submissions)
    }
}

/// Ledger reference of a client-keyed vote purchase.
fn purchase_ref(contest_id: &ContestId, key: &str) -> String {
    format!("vote-purchase:{contest_id}:{key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use storyvault_store::RocksStore;
    use tempfile::TempDir;

    struct Fixture {
        admission: VoteAdmission,
        store: Arc<RocksStore>,
        contest: Contest,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let admission = VoteAdmission::new(
            store.clone(),
            VotingConfig::default(),
            RetryPolicy::default(),
        );
        let now = Utc::now();
        let contest = admission
            .create_contest(
                Some(ContestId::new("spring").unwrap()),
                "Spring Stories",
                now - Duration::hours(1),
                now + Duration::days(7),
            )
            .await
            .unwrap();
        Fixture {
            admission,
            store,
            contest,
            _dir: dir,
        }
    }

    async fn submit(f: &Fixture, id: &str) -> SubmissionId {
        f.admission
            .submit(
                &f.contest.id,
                UserId::new("author").unwrap(),
                Some(SubmissionId::new(id).unwrap()),
                "A story",
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn free_vote_then_exhausted() {
        let f = fixture().await;
        let story = submit(&f, "story-1").await;
        let voter = UserId::new("voter").unwrap();

        let outcome = f
            .admission
            .cast_vote(&voter, &f.contest.id, &story, Tier::Free)
            .await
            .unwrap();
        assert_eq!(outcome.remaining.get(Tier::Free), 0);
        assert_eq!(outcome.totals.total, 1);

        let second = f
            .admission
            .cast_vote(&voter, &f.contest.id, &story, Tier::Free)
            .await;
        assert!(matches!(
            second,
            Err(ApiError::AllowanceExhausted { tier: Tier::Free })
        ));
    }

    #[tokio::test]
    async fn closed_contest_rejects_votes() {
        let f = fixture().await;
        let now = Utc::now();
        let closed = f
            .admission
            .create_contest(
                None,
                "Last Year",
                now - Duration::days(30),
                now - Duration::days(1),
            )
            .await
            .unwrap();
        let voter = UserId::new("voter").unwrap();

        let result = f
            .admission
            .cast_vote(
                &voter,
                &closed.id,
                &SubmissionId::new("anything").unwrap(),
                Tier::Free,
            )
            .await;
        assert!(matches!(result, Err(ApiError::ContestNotVotable(_))));
    }

    #[tokio::test]
    async fn unknown_submission_is_not_found() {
        let f = fixture().await;
        let voter = UserId::new("voter").unwrap();

        let result = f
            .admission
            .cast_vote(
                &voter,
                &f.contest.id,
                &SubmissionId::new("missing").unwrap(),
                Tier::Free,
            )
            .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));

        let remaining = f
            .admission
            .votes_remaining(&voter, &f.contest.id)
            .await
            .unwrap();
        assert_eq!(remaining, VotingConfig::default().default_allowance);
    }

    #[tokio::test]
    async fn purchased_votes_are_weighted() {
        let f = fixture().await;
        let story = submit(&f, "story-1").await;
        let voter = UserId::new("patron").unwrap();
        f.store
            .append_entry(LedgerEntry::admin_grant(voter.clone(), 50, "promo").unwrap())
            .unwrap();

        let bought = f
            .admission
            .purchase_votes(&voter, &f.contest.id, Tier::Super, 1, Some("order-1"))
            .await
            .unwrap();
        assert!(bought.applied);
        assert_eq!(bought.balance, 25);

        let replay = f
            .admission
            .purchase_votes(&voter, &f.contest.id, Tier::Super, 1, Some("order-1"))
            .await
            .unwrap();
        assert!(!replay.applied);
        assert_eq!(replay.balance, 25);

        f.admission
            .cast_vote(&voter, &f.contest.id, &story, Tier::Super)
            .await
            .unwrap();
        let outcome = f
            .admission
            .cast_vote(&voter, &f.contest.id, &story, Tier::Free)
            .await
            .unwrap();
        assert_eq!(outcome.totals.total, 2);
        assert_eq!(outcome.totals.weighted_total, 4);
    }

    #[tokio::test]
    async fn free_votes_cannot_be_bought() {
        let f = fixture().await;
        let voter = UserId::new("voter").unwrap();
        let result = f
            .admission
            .purchase_votes(&voter, &f.contest.id, Tier::Free, 1, None)
            .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn purchase_without_credits_is_refused() {
        let f = fixture().await;
        let voter = UserId::new("broke").unwrap();
        f.store.create_account(&voter, None).unwrap();

        let result = f
            .admission
            .purchase_votes(&voter, &f.contest.id, Tier::Premium, 2, None)
            .await;
        assert!(matches!(
            result,
            Err(ApiError::InsufficientCredits {
                balance: 0,
                required: 20
            })
        ));
    }

    #[tokio::test]
    async fn leaderboard_ranks_by_weight() {
        let f = fixture().await;
        let first = submit(&f, "first").await;
        let second = submit(&f, "second").await;
        f.store
            .append_entry(
                LedgerEntry::admin_grant(UserId::new("fan").unwrap(), 100, "promo").unwrap(),
            )
            .unwrap();
        let fan = UserId::new("fan").unwrap();
        f.admission
            .purchase_votes(&fan, &f.contest.id, Tier::Premium, 1, None)
            .await
            .unwrap();

        f.admission
            .cast_vote(&UserId::new("a").unwrap(), &f.contest.id, &first, Tier::Free)
            .await
            .unwrap();
        f.admission
            .cast_vote(&fan, &f.contest.id, &second, Tier::Premium)
            .await
            .unwrap();

        let board = f.admission.leaderboard(&f.contest.id, 10).await.unwrap();
        assert_eq!(board[0].id, second);
        assert_eq!(board[1].id, first);
    }

    #[tokio::test]
    async fn duplicate_contest_is_conflict() {
        let f = fixture().await;
        let now = Utc::now();
        let result = f.admission.create_contest(
            Some(f.contest.id.clone()),
            "Again",
            now,
            now + Duration::days(1),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Conflict(_))));
    }
}
