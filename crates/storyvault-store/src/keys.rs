//! Key encoding utilities for `RocksDB`.
//!
//! Document ids have variable length, so composite keys encode each id as a
//! one-byte length followed by its bytes. The length prefix keeps one user's
//! prefix from matching another user whose id merely starts the same way.

use storyvault_core::{
    view::day_prefix, ContentId, ContestId, EntryId, SubmissionId, UserId, VoteId, MAX_ID_LEN,
};

use chrono::NaiveDate;

use crate::error::{Result, StoreError};

const ULID_LEN: usize = 16;

/// Append a length-prefixed segment.
fn push_segment(key: &mut Vec<u8>, bytes: &[u8]) {
    debug_assert!(bytes.len() <= MAX_ID_LEN);
    // Ids are at most MAX_ID_LEN (128) bytes, so the length fits in a u8.
    #[allow(clippy::cast_possible_truncation)]
    key.push(bytes.len() as u8);
    key.extend_from_slice(bytes);
}

fn segment(bytes: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + bytes.len());
    push_segment(&mut key, bytes);
    key
}

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a ledger entry key from an entry ID.
#[must_use]
pub fn entry_key(entry_id: &EntryId) -> Vec<u8> {
    entry_id.to_bytes().to_vec()
}

/// Create a user-entry index key.
///
/// Format: `len(user_id) || user_id || entry_id (16 bytes)`
///
/// Since ULIDs are time-ordered, entries for a user sort by creation time.
#[must_use]
pub fn user_entry_key(user_id: &UserId, entry_id: &EntryId) -> Vec<u8> {
    let mut key = user_entries_prefix(user_id);
    key.extend_from_slice(&entry_id.to_bytes());
    key
}

/// Create a prefix for iterating all ledger entries of a user.
#[must_use]
pub fn user_entries_prefix(user_id: &UserId) -> Vec<u8> {
    segment(user_id.as_bytes())
}

/// Upper bound for a reverse seek over a user's entries.
#[must_use]
pub fn user_entries_upper_bound(user_id: &UserId) -> Vec<u8> {
    let mut key = user_entries_prefix(user_id);
    key.extend_from_slice(&[0xFF; ULID_LEN]);
    key
}

/// Extract the entry ID from a user-entry index key.
///
/// # Errors
///
/// Returns `StoreError::Database` if the key is shorter than an entry id.
pub fn entry_id_from_user_key(key: &[u8]) -> Result<EntryId> {
    let start = key
        .len()
        .checked_sub(ULID_LEN)
        .ok_or_else(|| StoreError::Database(format!("malformed ledger index key: {key:?}")))?;
    entry_id_from_bytes(&key[start..])
}

/// Decode a 16-byte entry id.
///
/// # Errors
///
/// Returns `StoreError::Database` if `bytes` is not exactly 16 bytes.
pub fn entry_id_from_bytes(bytes: &[u8]) -> Result<EntryId> {
    let raw: [u8; ULID_LEN] = bytes
        .try_into()
        .map_err(|_| StoreError::Database(format!("malformed entry id: {bytes:?}")))?;
    Ok(EntryId::from_bytes(raw))
}

/// Create an idempotency key for a user's external reference.
///
/// Format: `len(user_id) || user_id || external_ref`
#[must_use]
pub fn entry_ref_key(user_id: &UserId, external_ref: &str) -> Vec<u8> {
    let mut key = user_entries_prefix(user_id);
    key.extend_from_slice(external_ref.as_bytes());
    key
}

/// Create a contest key.
#[must_use]
pub fn contest_key(contest_id: &ContestId) -> Vec<u8> {
    contest_id.as_bytes().to_vec()
}

/// Create a submission key.
///
/// Format: `len(contest_id) || contest_id || len(submission_id) || submission_id`
#[must_use]
pub fn submission_key(contest_id: &ContestId, submission_id: &SubmissionId) -> Vec<u8> {
    let mut key = submissions_prefix(contest_id);
    push_segment(&mut key, submission_id.as_bytes());
    key
}

/// Create a prefix for iterating the submissions of a contest.
#[must_use]
pub fn submissions_prefix(contest_id: &ContestId) -> Vec<u8> {
    segment(contest_id.as_bytes())
}

/// Create a vote allowance key.
///
/// Format: `len(user_id) || user_id || len(contest_id) || contest_id`
#[must_use]
pub fn allowance_key(user_id: &UserId, contest_id: &ContestId) -> Vec<u8> {
    let mut key = segment(user_id.as_bytes());
    push_segment(&mut key, contest_id.as_bytes());
    key
}

/// Create a vote record key.
///
/// Format: `submission_key || vote_id (16 bytes)`
#[must_use]
pub fn vote_key(contest_id: &ContestId, submission_id: &SubmissionId, vote_id: &VoteId) -> Vec<u8> {
    let mut key = submission_key(contest_id, submission_id);
    key.extend_from_slice(&vote_id.to_bytes());
    key
}

/// Create a settlement key from a payment session id.
#[must_use]
pub fn settlement_key(session_id: &str) -> Vec<u8> {
    session_id.as_bytes().to_vec()
}

/// Create a content stats key.
#[must_use]
pub fn content_stats_key(content_id: &ContentId) -> Vec<u8> {
    content_id.as_bytes().to_vec()
}

/// First fingerprint key of `day`; every key of an earlier day sorts before it.
#[must_use]
pub fn fingerprint_day_start(day: NaiveDate) -> Vec<u8> {
    day_prefix(day).to_vec()
}
