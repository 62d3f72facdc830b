//! Contest, submission and voting handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use storyvault_core::{Contest, ContestId, Submission, SubmissionId, Tier, TierCounts, VoteTotals};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Contest response.
#[derive(Debug, Serialize)]
pub struct ContestResponse {
    /// Contest ID.
    pub id: String,
    /// Title.
    pub title: String,
    /// Voting window start.
    pub voting_opens_at: String,
    /// Voting window end (exclusive).
    pub voting_closes_at: String,
    /// Whether votes are accepted right now.
    pub votable: bool,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Contest> for ContestResponse {
    fn from(contest: &Contest) -> Self {
        Self {
            id: contest.id.to_string(),
            title: contest.title.clone(),
            voting_opens_at: contest.voting_opens_at.to_rfc3339(),
            voting_closes_at: contest.voting_closes_at.to_rfc3339(),
            votable: contest.is_votable_at(Utc::now()),
            created_at: contest.created_at.to_rfc3339(),
        }
    }
}

/// Submission response.
#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
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
    pub created_at: String,
}

impl From<&Submission> for SubmissionResponse {
    fn from(submission: &Submission) -> Self {
        Self {
            id: submission.id.to_string(),
            contest_id: submission.contest_id.to_string(),
            author_id: submission.author_id.to_string(),
            title: submission.title.clone(),
            votes: submission.votes,
            created_at: submission.created_at.to_rfc3339(),
        }
    }
}

/// Get a contest.
pub async fn get_contest(
    State(state): State<Arc<AppState>>,
    Path(contest_id): Path<String>,
) -> Result<Json<ContestResponse>, ApiError> {
    let contest = state.votes.contest(&contest_id.parse()?).await?;
    Ok(Json(ContestResponse::from(&contest)))
}

/// Create submission request.
#[derive(Debug, Deserialize)]
pub struct CreateSubmissionRequest {
    /// Story title.
    pub title: String,
    /// Document ID of the story; generated when absent.
    #[serde(default)]
    pub submission_id: Option<String>,
}

/// Enter the current user's story into a contest.
pub async fn create_submission(
    State(state): State<Arc<AppState>>,
    Path(contest_id): Path<String>,
    auth: AuthUser,
    Json(body): Json<CreateSubmissionRequest>,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    let contest_id: ContestId = contest_id.parse()?;
    let submission_id = body
        .submission_id
        .as_deref()
        .map(str::parse::<SubmissionId>)
        .transpose()?;

    let submission = state
        .votes
        .submit(&contest_id, auth.user_id, submission_id, &body.title)
        .await?;

    Ok((StatusCode::CREATED, Json(SubmissionResponse::from(&submission))))
}

/// Leaderboard query parameters.
#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    /// Maximum number of submissions (default: 20, max: 100).
    #[serde(default = "default_leaderboard_limit")]
    pub limit: usize,
}

fn default_leaderboard_limit() -> usize {
    20
}

/// A ranked submission.
#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    /// 1-based rank.
    pub rank: usize,
    /// The submission.
    #[serde(flatten)]
    pub submission: SubmissionResponse,
}

/// Leaderboard response.
#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    /// Contest ID.
    pub contest_id: String,
    /// Submissions, best first.
    pub entries: Vec<LeaderboardEntry>,
}

/// Ranked submissions of a contest.
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Path(contest_id): Path<String>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let contest_id: ContestId = contest_id.parse()?;
    let submissions = state.votes.leaderboard(&contest_id, query.limit).await?;

    let entries = submissions
        .iter()
        .enumerate()
        .map(|(i, submission)| LeaderboardEntry {
            rank: i + 1,
            submission: SubmissionResponse::from(submission),
        })
        .collect();

    Ok(Json(LeaderboardResponse {
        contest_id: contest_id.to_string(),
        entries,
    }))
}

/// Remaining votes response.
#[derive(Debug, Serialize)]
pub struct VotesRemainingResponse {
    /// Contest ID.
    pub contest_id: String,
    /// Votes left per tier.
    pub remaining: TierCounts,
}

/// Votes the current user has left in a contest.
pub async fn votes_remaining(
    State(state): State<Arc<AppState>>,
    Path(contest_id): Path<String>,
    auth: AuthUser,
) -> Result<Json<VotesRemainingResponse>, ApiError> {
    let contest_id: ContestId = contest_id.parse()?;
    let remaining = state
        .votes
        .votes_remaining(&auth.user_id, &contest_id)
        .await?;

    Ok(Json(VotesRemainingResponse {
        contest_id: contest_id.to_string(),
        remaining,
    }))
}

/// Cast vote request.
#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    /// Submission to vote for.
    pub submission_id: String,
    /// `free`, `premium` or `super`.
    pub tier: String,
}

/// Cast vote response.
#[derive(Debug, Serialize)]
pub struct CastVoteResponse {
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

/// Cast a vote.
pub async fn cast_vote(
    State(state): State<Arc<AppState>>,
    Path(contest_id): Path<String>,
    auth: AuthUser,
    Json(body): Json<CastVoteRequest>,
) -> Result<(StatusCode, Json<CastVoteResponse>), ApiError> {
    let contest_id: ContestId = contest_id.parse()?;
    let submission_id: SubmissionId = body.submission_id.parse()?;
    let tier: Tier = body.tier.parse()?;

    let outcome = state
        .votes
        .cast_vote(&auth.user_id, &contest_id, &submission_id, tier)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CastVoteResponse {
            vote_id: outcome.vote.id.to_string(),
            submission_id: submission_id.to_string(),
            tier,
            weight: outcome.vote.weight,
            remaining: outcome.remaining,
            submission_votes: outcome.totals,
        }),
    ))
}

/// Purchase votes request.
#[derive(Debug, Deserialize)]
pub struct PurchaseVotesRequest {
    /// `premium` or `super`.
    pub tier: String,
    /// Number of votes.
    pub count: u32,
    /// Makes retries safe; also accepted as the `Idempotency-Key` header.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Purchase votes response.
#[derive(Debug, Serialize)]
pub struct PurchaseVotesResponse {
    /// `false` if the idempotency key had already been used.
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

/// Buy paid votes with credits.
pub async fn purchase_votes(
    State(state): State<Arc<AppState>>,
    Path(contest_id): Path<String>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(body): Json<PurchaseVotesRequest>,
) -> Result<Json<PurchaseVotesResponse>, ApiError> {
    let contest_id: ContestId = contest_id.parse()?;
    let tier: Tier = body.tier.parse()?;
    let idempotency_key = body.idempotency_key.as_deref().or_else(|| {
        headers
            .get("idempotency-key")
            .and_then(|v| v.to_str().ok())
    });

    let outcome = state
        .votes
        .purchase_votes(&auth.user_id, &contest_id, tier, body.count, idempotency_key)
        .await?;

    // A replay reports what the original purchase bought.
    let (tier, count) = outcome
        .entry
        .votes
        .as_ref()
        .map_or((tier, body.count), |votes| (votes.tier, votes.count));

    Ok(Json(PurchaseVotesResponse {
        applied: outcome.applied,
        tier,
        count,
        credits_spent: outcome.entry.amount.saturating_abs(),
        balance: outcome.balance,
        remaining: outcome.remaining,
    }))
}
