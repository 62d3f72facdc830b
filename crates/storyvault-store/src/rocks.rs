//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait on
//! a pessimistic `TransactionDB`. Reads that feed a write take an exclusive row
//! lock with `get_for_update_cf`, so two transactions touching the same account,
//! allowance, submission, settlement or fingerprint are serialized.
//!
//! Lock order is fixed to keep transactions deadlock-free:
//! settlement, ledger ref, account, allowance, submission; and separately
//! fingerprint, content stats.

use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, ErrorKind, IteratorMode, MultiThreaded,
    Options, Transaction, TransactionDB, TransactionDBOptions, TransactionOptions, WriteOptions,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use storyvault_core::{
    Account, ContentId, ContentStats, Contest, ContestId, EntryId, LedgerEntry, LedgerError,
    SettlementRecord, Submission, SubmissionId, Tier, TierCounts, UserId, ViewFingerprint,
    VoteAllowance, VoteRecord,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{AppendOutcome, CastOutcome, PurchaseOutcome, SettleOutcome, Store, ViewOutcome};

type Db = TransactionDB<MultiThreaded>;
type Txn<'a> = Transaction<'a, Db>;
type Cf<'a> = Arc<BoundColumnFamily<'a>>;

/// Default time a transaction waits for a row lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT_MS: i64 = 2_000;

/// Fingerprints deleted per purge transaction.
const PURGE_BATCH: usize = 1_000;

/// Map a `RocksDB` error, separating lock contention from real failures.
fn db_err(e: rocksdb::Error) -> StoreError {
    match e.kind() {
        ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
            StoreError::Conflict(e.to_string())
        }
        _ => StoreError::Database(e.to_string()),
    }
}

/// Outcome of staging a ledger entry inside an open transaction.
enum Staged {
    /// The external reference was applied before; nothing was written.
    Replayed { entry: LedgerEntry, balance: i64 },
    /// The entry, its indexes and the account projection were written.
    Applied { balance: i64 },
}

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<Db>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_lock_timeout(path, DEFAULT_LOCK_TIMEOUT_MS)
    }

    /// Open or create a database whose transactions wait at most
    /// `lock_timeout_ms` for a row lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open_with_lock_timeout<P: AsRef<Path>>(path: P, lock_timeout_ms: i64) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(lock_timeout_ms);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = Db::open_cf_descriptors(&opts, &txn_db_opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Cf<'_>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Start a transaction with deadlock detection.
    fn begin(&self) -> Txn<'_> {
        let mut txn_opts = TransactionOptions::default();
        txn_opts.set_deadlock_detect(true);
        self.db.transaction_opt(&WriteOptions::default(), &txn_opts)
    }

    /// Read a value outside any transaction.
    fn get_value<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(db_err)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Read a value and hold an exclusive lock on its key until the
    /// transaction ends.
    fn lock_read<T: DeserializeOwned>(txn: &Txn<'_>, cf: &Cf<'_>, key: &[u8]) -> Result<Option<T>> {
        txn.get_for_update_cf(cf, key, true)
            .map_err(db_err)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Read a value through the transaction without locking it.
    fn txn_read<T: DeserializeOwned>(txn: &Txn<'_>, cf: &Cf<'_>, key: &[u8]) -> Result<Option<T>> {
        txn.get_cf(cf, key)
            .map_err(db_err)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn txn_put<T: Serialize>(txn: &Txn<'_>, cf: &Cf<'_>, key: &[u8], value: &T) -> Result<()> {
        txn.put_cf(cf, key, Self::serialize(value)?).map_err(db_err)
    }

    /// IDs of a user's entries, oldest first.
    fn user_entry_ids(&self, user_id: &UserId) -> Result<Vec<EntryId>> {
        let cf_by_user = self.cf(cf::LEDGER_BY_USER)?;
        let prefix = keys::user_entries_prefix(user_id);

        let iter = self
            .db
            .iterator_cf(&cf_by_user, IteratorMode::From(&prefix, Direction::Forward));

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(db_err)?;
            if !key.starts_with(&prefix) {
                break;
            }
            ids.push(keys::entry_id_from_user_key(&key)?);
        }
        Ok(ids)
    }

    /// All entries of a user, oldest first.
    fn entries_for_user(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        for entry_id in self.user_entry_ids(user_id)? {
            let entry = self.get_entry(&entry_id)?.ok_or_else(|| {
                StoreError::Database(format!("ledger index points at missing entry {entry_id}"))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Stage a ledger entry in `txn`: enforce idempotency on the external
    /// reference, lock and update the account, and write the entry with its
    /// indexes. Nothing is committed here.
    fn stage_entry(&self, txn: &Txn<'_>, entry: &mut LedgerEntry) -> Result<Staged> {
        entry.validate()?;

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_ledger = self.cf(cf::LEDGER)?;
        let cf_by_user = self.cf(cf::LEDGER_BY_USER)?;
        let cf_refs = self.cf(cf::LEDGER_REFS)?;

        let account_key = keys::account_key(&entry.user_id);
        let ref_key = entry
            .external_ref
            .as_deref()
            .map(|external_ref| keys::entry_ref_key(&entry.user_id, external_ref));

        if let Some(ref_key) = &ref_key {
            if let Some(raw) = txn.get_for_update_cf(&cf_refs, ref_key, true).map_err(db_err)? {
                let existing_id = keys::entry_id_from_bytes(&raw)?;
                let existing: LedgerEntry =
                    Self::txn_read(txn, &cf_ledger, &keys::entry_key(&existing_id))?.ok_or_else(
                        || StoreError::Database(format!("dangling ledger reference {existing_id}")),
                    )?;
                let balance = Self::txn_read::<Account>(txn, &cf_accounts, &account_key)?
                    .map_or(existing.balance_after, |account| account.credit_balance);
                debug!(
                    user_id = %entry.user_id,
                    entry_id = %existing.id,
                    "external reference already applied"
                );
                return Ok(Staged::Replayed {
                    entry: existing,
                    balance,
                });
            }
        }

        let mut account = Self::lock_read::<Account>(txn, &cf_accounts, &account_key)?
            .unwrap_or_else(|| Account::new(entry.user_id.clone()));

        let required = entry.amount.saturating_abs();
        if entry.is_debit() && !account.has_sufficient_credits(required) {
            return Err(StoreError::InsufficientCredits {
                balance: account.credit_balance,
                required,
            });
        }
        let balance = account
            .credit_balance
            .checked_add(entry.amount)
            .ok_or(LedgerError::Overflow)?;

        entry.balance_after = balance;
        account.apply_entry(entry);

        Self::txn_put(txn, &cf_accounts, &account_key, &account)?;
        Self::txn_put(txn, &cf_ledger, &keys::entry_key(&entry.id), &*entry)?;
        txn.put_cf(&cf_by_user, keys::user_entry_key(&entry.user_id, &entry.id), b"")
            .map_err(db_err)?;
        if let Some(ref_key) = ref_key {
            txn.put_cf(&cf_refs, ref_key, entry.id.to_bytes())
                .map_err(db_err)?;
        }

        Ok(Staged::Applied { balance })
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        self.get_value(cf::ACCOUNTS, &keys::account_key(user_id))
    }

    fn create_account(&self, user_id: &UserId, email: Option<String>) -> Result<(Account, bool)> {
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(user_id);
        let txn = self.begin();

        if let Some(mut existing) = Self::lock_read::<Account>(&txn, &cf_accounts, &key)? {
            if existing.email.is_none() && email.is_some() {
                existing.email = email;
                existing.updated_at = Utc::now();
                Self::txn_put(&txn, &cf_accounts, &key, &existing)?;
                txn.commit().map_err(db_err)?;
            }
            return Ok((existing, false));
        }

        let mut account = Account::new(user_id.clone());
        account.email = email;
        Self::txn_put(&txn, &cf_accounts, &key, &account)?;
        txn.commit().map_err(db_err)?;

        Ok((account, true))
    }

    fn set_stripe_customer(&self, user_id: &UserId, customer_id: &str) -> Result<()> {
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(user_id);
        let txn = self.begin();

        let mut account = Self::lock_read::<Account>(&txn, &cf_accounts, &key)?.ok_or_else(|| {
            StoreError::NotFound {
                entity: "account",
                id: user_id.to_string(),
            }
        })?;
        account.stripe_customer_id = Some(customer_id.to_string());
        account.updated_at = Utc::now();
        Self::txn_put(&txn, &cf_accounts, &key, &account)?;
        txn.commit().map_err(db_err)
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    fn append_entry(&self, mut entry: LedgerEntry) -> Result<AppendOutcome> {
        let txn = self.begin();
        match self.stage_entry(&txn, &mut entry)? {
            Staged::Replayed { entry, balance } => Ok(AppendOutcome {
                entry,
                balance,
                applied: false,
            }),
            Staged::Applied { balance } => {
                txn.commit().map_err(db_err)?;
                Ok(AppendOutcome {
                    entry,
                    balance,
                    applied: true,
                })
            }
        }
    }

    fn get_entry(&self, entry_id: &EntryId) -> Result<Option<LedgerEntry>> {
        self.get_value(cf::LEDGER, &keys::entry_key(entry_id))
    }

    fn find_entry_by_ref(
        &self,
        user_id: &UserId,
        external_ref: &str,
    ) -> Result<Option<LedgerEntry>> {
        let cf_refs = self.cf(cf::LEDGER_REFS)?;
        let key = keys::entry_ref_key(user_id, external_ref);

        match self.db.get_cf(&cf_refs, key).map_err(db_err)? {
            Some(raw) => self.get_entry(&keys::entry_id_from_bytes(&raw)?),
            None => Ok(None),
        }
    }

    fn list_entries_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        // ULIDs sort by time, so reversing the index gives newest first.
        for entry_id in self
            .user_entry_ids(user_id)?
            .into_iter()
            .rev()
            .skip(offset)
            .take(limit)
        {
            if let Some(entry) = self.get_entry(&entry_id)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn sum_for_user(&self, user_id: &UserId) -> Result<i64> {
        self.entries_for_user(user_id)?
            .iter()
            .try_fold(0i64, |sum, entry| sum.checked_add(entry.amount))
            .ok_or_else(|| LedgerError::Overflow.into())
    }

    fn latest_entry_id(&self, user_id: &UserId) -> Result<Option<EntryId>> {
        let cf_by_user = self.cf(cf::LEDGER_BY_USER)?;
        let prefix = keys::user_entries_prefix(user_id);
        let upper = keys::user_entries_upper_bound(user_id);

        let mut iter = self
            .db
            .iterator_cf(&cf_by_user, IteratorMode::From(&upper, Direction::Reverse));

        match iter.next() {
            Some(item) => {
                let (key, _) = item.map_err(db_err)?;
                if key.starts_with(&prefix) {
                    Ok(Some(keys::entry_id_from_user_key(&key)?))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    fn rebuild_balance(&self, user_id: &UserId) -> Result<Account> {
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(user_id);
        let txn = self.begin();

        // Appends lock the account row too, so the ledger cannot move under us.
        let existing = Self::lock_read::<Account>(&txn, &cf_accounts, &key)?;
        let entries = self.entries_for_user(user_id)?;
        if existing.is_none() && entries.is_empty() {
            return Err(StoreError::NotFound {
                entity: "account",
                id: user_id.to_string(),
            });
        }

        let mut account = existing.unwrap_or_else(|| Account::new(user_id.clone()));
        account.credit_balance = 0;
        account.lifetime_purchased = 0;
        account.lifetime_granted = 0;
        account.lifetime_spent = 0;
        account.last_entry_id = None;
        for entry in &entries {
            account.apply_entry(entry);
        }

        Self::txn_put(&txn, &cf_accounts, &key, &account)?;
        txn.commit().map_err(db_err)?;

        info!(
            user_id = %user_id,
            balance = account.credit_balance,
            entries = entries.len(),
            "rebuilt balance from ledger"
        );
        Ok(account)
    }

    // =========================================================================
    // Contest Operations
    // =========================================================================

    fn put_contest(&self, contest: &Contest) -> Result<()> {
        let cf = self.cf(cf::CONTESTS)?;
        let value = Self::serialize(contest)?;

        self.db
            .put_cf(&cf, keys::contest_key(&contest.id), value)
            .map_err(db_err)
    }

    fn get_contest(&self, contest_id: &ContestId) -> Result<Option<Contest>> {
        self.get_value(cf::CONTESTS, &keys::contest_key(contest_id))
    }

    fn create_submission(&self, submission: &Submission) -> Result<()> {
        let cf_submissions = self.cf(cf::SUBMISSIONS)?;
        let key = keys::submission_key(&submission.contest_id, &submission.id);
        let txn = self.begin();

        if txn
            .get_for_update_cf(&cf_submissions, &key, true)
            .map_err(db_err)?
            .is_some()
        {
            return Err(StoreError::AlreadyExists {
                entity: "submission",
                id: submission.id.to_string(),
            });
        }

        Self::txn_put(&txn, &cf_submissions, &key, submission)?;
        txn.commit().map_err(db_err)
    }

    fn get_submission(
        &self,
        contest_id: &ContestId,
        submission_id: &SubmissionId,
    ) -> Result<Option<Submission>> {
        self.get_value(
            cf::SUBMISSIONS,
            &keys::submission_key(contest_id, submission_id),
        )
    }

    fn list_submissions(&self, contest_id: &ContestId) -> Result<Vec<Submission>> {
        let cf_submissions = self.cf(cf::SUBMISSIONS)?;
        let prefix = keys::submissions_prefix(contest_id);

        let iter = self
            .db
            .iterator_cf(&cf_submissions, IteratorMode::From(&prefix, Direction::Forward));

        let mut submissions = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(db_err)?;
            if !key.starts_with(&prefix) {
                break;
            }
            submissions.push(Self::deserialize(&value)?);
        }
        Ok(submissions)
    }

    // =========================================================================
    // Voting Operations
    // =========================================================================

    fn get_or_create_allowance(
        &self,
        user_id: &UserId,
        contest_id: &ContestId,
        allotment: TierCounts,
    ) -> Result<VoteAllowance> {
        let cf_allowances = self.cf(cf::ALLOWANCES)?;
        let key = keys::allowance_key(user_id, contest_id);
        let txn = self.begin();

        if let Some(allowance) = Self::lock_read(&txn, &cf_allowances, &key)? {
            return Ok(allowance);
        }

        let allowance = VoteAllowance::new(user_id.clone(), contest_id.clone(), allotment);
        Self::txn_put(&txn, &cf_allowances, &key, &allowance)?;
        txn.commit().map_err(db_err)?;

        Ok(allowance)
    }

    fn cast_vote(&self, vote: &VoteRecord, allotment: TierCounts) -> Result<CastOutcome> {
        let cf_allowances = self.cf(cf::ALLOWANCES)?;
        let cf_votes = self.cf(cf::VOTES)?;
        let cf_submissions = self.cf(cf::SUBMISSIONS)?;
        let txn = self.begin();

        let allowance_key = keys::allowance_key(&vote.user_id, &vote.contest_id);
        let mut allowance = Self::lock_read::<VoteAllowance>(&txn, &cf_allowances, &allowance_key)?
            .unwrap_or_else(|| {
                VoteAllowance::new(vote.user_id.clone(), vote.contest_id.clone(), allotment)
            });

        if !allowance.try_consume(vote.tier) {
            return Err(StoreError::AllowanceExhausted { tier: vote.tier });
        }

        Self::txn_put(&txn, &cf_allowances, &allowance_key, &allowance)?;
        Self::txn_put(
            &txn,
            &cf_votes,
            &keys::vote_key(&vote.contest_id, &vote.submission_id, &vote.id),
            vote,
        )?;

        // Any failure from here on drops the transaction, which also discards
        // the allowance decrement above.
        let submission_key = keys::submission_key(&vote.contest_id, &vote.submission_id);
        let mut submission = Self::lock_read::<Submission>(&txn, &cf_submissions, &submission_key)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "submission",
                id: vote.submission_id.to_string(),
            })?;
        submission.votes.record(vote.tier, vote.weight);
        Self::txn_put(&txn, &cf_submissions, &submission_key, &submission)?;

        txn.commit().map_err(db_err)?;

        Ok(CastOutcome {
            vote: vote.clone(),
            remaining: allowance.remaining,
            totals: submission.votes,
        })
    }

    fn purchase_votes(
        &self,
        contest_id: &ContestId,
        tier: Tier,
        count: u32,
        allotment: TierCounts,
        mut entry: LedgerEntry,
    ) -> Result<PurchaseOutcome> {
        let cf_allowances = self.cf(cf::ALLOWANCES)?;
        let txn = self.begin();

        let staged = self.stage_entry(&txn, &mut entry)?;

        let allowance_key = keys::allowance_key(&entry.user_id, contest_id);
        let mut allowance = Self::lock_read::<VoteAllowance>(&txn, &cf_allowances, &allowance_key)?
            .unwrap_or_else(|| {
                VoteAllowance::new(entry.user_id.clone(), contest_id.clone(), allotment)
            });

        match staged {
            Staged::Replayed { entry, balance } => Ok(PurchaseOutcome {
                entry,
                balance,
                remaining: allowance.remaining,
                applied: false,
            }),
            Staged::Applied { balance } => {
                allowance.add(tier, count);
                Self::txn_put(&txn, &cf_allowances, &allowance_key, &allowance)?;
                txn.commit().map_err(db_err)?;

                Ok(PurchaseOutcome {
                    entry,
                    balance,
                    remaining: allowance.remaining,
                    applied: true,
                })
            }
        }
    }

    // =========================================================================
    // Settlement Operations
    // =========================================================================

    fn get_settlement(&self, session_id: &str) -> Result<Option<SettlementRecord>> {
        self.get_value(cf::SETTLEMENTS, &keys::settlement_key(session_id))
    }

    fn settle_payment(&self, session_id: &str, mut entry: LedgerEntry) -> Result<SettleOutcome> {
        let cf_settlements = self.cf(cf::SETTLEMENTS)?;
        let key = keys::settlement_key(session_id);
        let txn = self.begin();

        if let Some(record) = Self::lock_read::<SettlementRecord>(&txn, &cf_settlements, &key)? {
            return Ok(SettleOutcome {
                record,
                applied: false,
            });
        }

        // A ledger entry can already carry this session as its reference (for
        // example an admin credit); the record then points at that entry.
        let (credited, applied) = match self.stage_entry(&txn, &mut entry)? {
            Staged::Replayed { entry, .. } => (entry, false),
            Staged::Applied { .. } => (entry, true),
        };

        let record = SettlementRecord {
            session_id: session_id.to_string(),
            user_id: credited.user_id.clone(),
            entry_id: credited.id,
            credits: credited.amount,
            balance_after: credited.balance_after,
            settled_at: Utc::now(),
        };
        Self::txn_put(&txn, &cf_settlements, &key, &record)?;
        txn.commit().map_err(db_err)?;

        Ok(SettleOutcome { record, applied })
    }

    // =========================================================================
    // View Operations
    // =========================================================================

    fn record_view(&self, fingerprint: &ViewFingerprint) -> Result<ViewOutcome> {
        let cf_fingerprints = self.cf(cf::VIEW_FINGERPRINTS)?;
        let cf_stats = self.cf(cf::CONTENT_STATS)?;
        let stats_key = keys::content_stats_key(&fingerprint.content_id);
        let txn = self.begin();

        let seen = txn
            .get_for_update_cf(&cf_fingerprints, &fingerprint.key, true)
            .map_err(db_err)?
            .is_some();
        if seen {
            debug!(
                content_id = %fingerprint.content_id,
                fingerprint = %fingerprint.digest_hex(),
                "view already counted today"
            );
            let views = Self::txn_read::<ContentStats>(&txn, &cf_stats, &stats_key)?
                .map_or(0, |stats| stats.views);
            return Ok(ViewOutcome {
                counted: false,
                views,
            });
        }

        let mut stats = Self::lock_read::<ContentStats>(&txn, &cf_stats, &stats_key)?
            .unwrap_or_else(|| ContentStats::new(fingerprint.content_id.clone()));
        stats.views += 1;
        stats.updated_at = Utc::now();

        Self::txn_put(&txn, &cf_fingerprints, &fingerprint.key, fingerprint)?;
        Self::txn_put(&txn, &cf_stats, &stats_key, &stats)?;
        txn.commit().map_err(db_err)?;

        Ok(ViewOutcome {
            counted: true,
            views: stats.views,
        })
    }

    fn get_content_stats(&self, content_id: &ContentId) -> Result<Option<ContentStats>> {
        self.get_value(cf::CONTENT_STATS, &keys::content_stats_key(content_id))
    }

    fn purge_fingerprints_before(&self, day: NaiveDate) -> Result<usize> {
        let cf_fingerprints = self.cf(cf::VIEW_FINGERPRINTS)?;
        let cutoff = keys::fingerprint_day_start(day);
        let mut removed = 0;

        loop {
            let mut batch = Vec::with_capacity(PURGE_BATCH);
            for item in self.db.iterator_cf(&cf_fingerprints, IteratorMode::Start) {
                let (key, _) = item.map_err(db_err)?;
                if key[..] >= cutoff[..] || batch.len() >= PURGE_BATCH {
                    break;
                }
                batch.push(key);
            }
            if batch.is_empty() {
                break;
            }

            let txn = self.begin();
            for key in &batch {
                txn.delete_cf(&cf_fingerprints, key).map_err(db_err)?;
            }
            txn.commit().map_err(db_err)?;
            removed += batch.len();
        }

        info!(removed, before = %day, "purged view fingerprints");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use storyvault_core::{EntryReason, VoteTotals};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn seed_contest(store: &RocksStore) -> (ContestId, SubmissionId) {
        let contest_id = ContestId::new("spring-2026").unwrap();
        let submission_id = SubmissionId::new("story-1").unwrap();
        let submission = Submission::new(
            submission_id.clone(),
            contest_id.clone(),
            user("author"),
            "The Lighthouse".to_string(),
        );
        store.create_submission(&submission).unwrap();
        (contest_id, submission_id)
    }

    fn grant(store: &RocksStore, user_id: &UserId, credits: i64) {
        let entry = LedgerEntry::admin_grant(user_id.clone(), credits, "seed").unwrap();
        store.append_entry(entry).unwrap();
    }

    #[test]
    fn create_account_is_idempotent() {
        let (store, _dir) = create_test_store();
        let user_id = user("alice");

        let (account, created) = store.create_account(&user_id, None).unwrap();
        assert!(created);
        assert_eq!(account.credit_balance, 0);

        grant(&store, &user_id, 40);
        let (again, created) = store
            .create_account(&user_id, Some("alice@example.com".to_string()))
            .unwrap();
        assert!(!created);
        assert_eq!(again.credit_balance, 40);
        assert_eq!(again.email.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn append_updates_projection() {
        let (store, _dir) = create_test_store();
        let user_id = user("alice");

        let granted = store
            .append_entry(LedgerEntry::admin_grant(user_id.clone(), 50, "welcome").unwrap())
            .unwrap();
        assert!(granted.applied);
        assert_eq!(granted.balance, 50);
        assert_eq!(granted.entry.balance_after, 50);

        let spent = store
            .append_entry(LedgerEntry::vote_cast(user_id.clone(), 20, "2 premium votes").unwrap())
            .unwrap();
        assert_eq!(spent.balance, 30);

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.credit_balance, 30);
        assert_eq!(account.lifetime_granted, 50);
        assert_eq!(account.lifetime_spent, 20);
        assert_eq!(account.last_entry_id, Some(spent.entry.id));
    }

    #[test]
    fn overdraft_is_rejected_without_writes() {
        let (store, _dir) = create_test_store();
        let user_id = user("bob");
        grant(&store, &user_id, 10);

        let err = store
            .append_entry(LedgerEntry::vote_cast(user_id.clone(), 25, "1 super vote").unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientCredits {
                balance: 10,
                required: 25
            }
        ));

        assert_eq!(store.get_account(&user_id).unwrap().unwrap().credit_balance, 10);
        assert_eq!(store.list_entries_by_user(&user_id, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn invalid_entry_is_rejected() {
        let (store, _dir) = create_test_store();
        let mut entry = LedgerEntry::admin_grant(user("carol"), 5, "bonus").unwrap();
        entry.reason = EntryReason::VoteCast;

        assert!(matches!(
            store.append_entry(entry),
            Err(StoreError::InvalidEntry(_))
        ));
    }

    #[test]
    fn external_ref_applies_once() {
        let (store, _dir) = create_test_store();
        let user_id = user("dave");

        let first = store
            .append_entry(LedgerEntry::purchase(user_id.clone(), 100, "cs_test_1").unwrap())
            .unwrap();
        let second = store
            .append_entry(LedgerEntry::purchase(user_id.clone(), 100, "cs_test_1").unwrap())
            .unwrap();

        assert!(first.applied);
        assert!(!second.applied);
        assert_eq!(second.entry.id, first.entry.id);
        assert_eq!(second.balance, 100);
        assert_eq!(store.list_entries_by_user(&user_id, 10, 0).unwrap().len(), 1);

        let found = store.find_entry_by_ref(&user_id, "cs_test_1").unwrap().unwrap();
        assert_eq!(found.id, first.entry.id);
        assert!(store.find_entry_by_ref(&user_id, "cs_other").unwrap().is_none());
    }

    #[test]
    fn list_is_newest_first_with_pagination() {
        let (store, _dir) = create_test_store();
        let user_id = user("erin");

        let mut ids = Vec::new();
        for i in 1..=5 {
            let entry = LedgerEntry::admin_grant(user_id.clone(), i, "seed").unwrap();
            ids.push(store.append_entry(entry).unwrap().entry.id);
            thread::sleep(std::time::Duration::from_millis(2));
        }
        // Another user's entries never leak into the listing.
        grant(&store, &user("erin2"), 7);

        let page = store.list_entries_by_user(&user_id, 2, 0).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, ids[4]);
        assert_eq!(page[1].id, ids[3]);

        let rest = store.list_entries_by_user(&user_id, 10, 2).unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[2].id, ids[0]);

        assert_eq!(store.latest_entry_id(&user_id).unwrap(), Some(ids[4]));
        assert_eq!(store.latest_entry_id(&user("nobody")).unwrap(), None);
        assert_eq!(store.sum_for_user(&user_id).unwrap(), 15);
    }

    #[test]
    fn projection_matches_ledger_sum() {
        let (store, _dir) = create_test_store();
        let user_id = user("frank");

        grant(&store, &user_id, 100);
        store
            .append_entry(LedgerEntry::vote_cast(user_id.clone(), 30, "3 premium").unwrap())
            .unwrap();
        store
            .append_entry(LedgerEntry::admin_correction(user_id.clone(), -5, "refund fix").unwrap())
            .unwrap();
        let _ = store.append_entry(LedgerEntry::vote_cast(user_id.clone(), 500, "too much").unwrap());

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.credit_balance, 65);
        assert_eq!(store.sum_for_user(&user_id).unwrap(), 65);
    }

    #[test]
    fn rebuild_repairs_a_drifted_projection() {
        let (store, _dir) = create_test_store();
        let user_id = user("gina");
        grant(&store, &user_id, 30);
        grant(&store, &user_id, 12);

        let mut drifted = store.get_account(&user_id).unwrap().unwrap();
        drifted.credit_balance = 999;
        drifted.last_entry_id = None;
        let cf_accounts = store.cf(cf::ACCOUNTS).unwrap();
        store
            .db
            .put_cf(
                &cf_accounts,
                keys::account_key(&user_id),
                RocksStore::serialize(&drifted).unwrap(),
            )
            .unwrap();

        let rebuilt = store.rebuild_balance(&user_id).unwrap();
        assert_eq!(rebuilt.credit_balance, 42);
        assert_eq!(rebuilt.lifetime_granted, 42);
        assert_eq!(rebuilt.last_entry_id, store.latest_entry_id(&user_id).unwrap());

        assert!(matches!(
            store.rebuild_balance(&user("ghost")),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn weighted_tally() {
        let (store, _dir) = create_test_store();
        let (contest_id, submission_id) = seed_contest(&store);
        let voter = user("voter");
        let allotment = TierCounts::new(1, 0, 1);

        let super_vote = VoteRecord::new(
            voter.clone(),
            contest_id.clone(),
            submission_id.clone(),
            Tier::Super,
            3,
        );
        store.cast_vote(&super_vote, allotment).unwrap();

        let free_vote = VoteRecord::new(
            voter.clone(),
            contest_id.clone(),
            submission_id.clone(),
            Tier::Free,
            1,
        );
        let outcome = store.cast_vote(&free_vote, allotment).unwrap();

        assert_eq!(outcome.totals.total, 2);
        assert_eq!(outcome.totals.weighted_total, 4);
        assert_eq!(outcome.totals.by_tier, TierCounts::new(1, 0, 1));
        assert_eq!(outcome.remaining, TierCounts::new(0, 0, 0));

        let stored = store
            .get_submission(&contest_id, &submission_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.votes, outcome.totals);
    }

    #[test]
    fn exhausted_allowance_is_rejected() {
        let (store, _dir) = create_test_store();
        let (contest_id, submission_id) = seed_contest(&store);
        let voter = user("voter");
        let allotment = TierCounts::new(1, 0, 0);

        let vote = || {
            VoteRecord::new(
                voter.clone(),
                contest_id.clone(),
                submission_id.clone(),
                Tier::Free,
                1,
            )
        };
        store.cast_vote(&vote(), allotment).unwrap();

        assert!(matches!(
            store.cast_vote(&vote(), allotment),
            Err(StoreError::AllowanceExhausted { tier: Tier::Free })
        ));
        let premium = VoteRecord::new(
            voter.clone(),
            contest_id.clone(),
            submission_id.clone(),
            Tier::Premium,
            2,
        );
        assert!(matches!(
            store.cast_vote(&premium, allotment),
            Err(StoreError::AllowanceExhausted {
                tier: Tier::Premium
            })
        ));

        let stored = store
            .get_submission(&contest_id, &submission_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.votes.total, 1);
    }

    #[test]
    fn concurrent_free_votes_admit_exactly_one() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let (contest_id, submission_id) = seed_contest(&store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let contest_id = contest_id.clone();
                let submission_id = submission_id.clone();
                thread::spawn(move || {
                    let vote =
                        VoteRecord::new(user("racer"), contest_id, submission_id, Tier::Free, 1);
                    store.cast_vote(&vote, TierCounts::new(1, 0, 0))
                })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => admitted += 1,
                Err(StoreError::AllowanceExhausted { .. } | StoreError::Conflict(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(admitted, 1);
        let stored = store
            .get_submission(&contest_id, &submission_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.votes.total, 1);
    }

    #[test]
    fn failed_tally_update_rolls_back_allowance() {
        let (store, _dir) = create_test_store();
        let (contest_id, submission_id) = seed_contest(&store);
        let voter = user("voter");
        let allotment = TierCounts::new(1, 0, 0);
        store
            .get_or_create_allowance(&voter, &contest_id, allotment)
            .unwrap();

        let cf_submissions = store.cf(cf::SUBMISSIONS).unwrap();
        store
            .db
            .put_cf(
                &cf_submissions,
                keys::submission_key(&contest_id, &submission_id),
                b"not cbor",
            )
            .unwrap();

        let vote = VoteRecord::new(
            voter.clone(),
            contest_id.clone(),
            submission_id.clone(),
            Tier::Free,
            1,
        );
        assert!(matches!(
            store.cast_vote(&vote, allotment),
            Err(StoreError::Serialization(_))
        ));

        let allowance: VoteAllowance = store
            .get_value(cf::ALLOWANCES, &keys::allowance_key(&voter, &contest_id))
            .unwrap()
            .unwrap();
        assert_eq!(allowance.remaining, allotment);
    }

    #[test]
    fn missing_submission_leaves_allowance_untouched() {
        let (store, _dir) = create_test_store();
        let (contest_id, _) = seed_contest(&store);
        let voter = user("voter");

        let vote = VoteRecord::new(
            voter.clone(),
            contest_id.clone(),
            SubmissionId::new("nope").unwrap(),
            Tier::Free,
            1,
        );
        assert!(matches!(
            store.cast_vote(&vote, TierCounts::new(1, 0, 0)),
            Err(StoreError::NotFound {
                entity: "submission",
                ..
            })
        ));
        let allowance: Option<VoteAllowance> = store
            .get_value(cf::ALLOWANCES, &keys::allowance_key(&voter, &contest_id))
            .unwrap();
        assert!(allowance.is_none());
    }

    #[test]
    fn purchase_votes_debits_and_adds_allowance() {
        let (store, _dir) = create_test_store();
        let (contest_id, _) = seed_contest(&store);
        let voter = user("buyer");
        let allotment = TierCounts::new(1, 0, 0);
        grant(&store, &voter, 100);

        let entry = LedgerEntry::vote_cast(voter.clone(), 20, "2 premium votes")
            .unwrap()
            .with_votes(contest_id.clone(), Tier::Premium, 2)
            .with_external_ref("buy-1");
        let bought = store
            .purchase_votes(&contest_id, Tier::Premium, 2, allotment, entry)
            .unwrap();
        assert!(bought.applied);
        assert_eq!(bought.balance, 80);
        assert_eq!(bought.remaining, TierCounts::new(1, 2, 0));

        let replay = LedgerEntry::vote_cast(voter.clone(), 20, "2 premium votes")
            .unwrap()
            .with_external_ref("buy-1");
        let again = store
            .purchase_votes(&contest_id, Tier::Premium, 2, allotment, replay)
            .unwrap();
        assert!(!again.applied);
        assert_eq!(again.balance, 80);
        assert_eq!(again.remaining, TierCounts::new(1, 2, 0));
        assert_eq!(again.entry.id, bought.entry.id);
        let votes = again.entry.votes.unwrap();
        assert_eq!((votes.tier, votes.count), (Tier::Premium, 2));

        let too_expensive = LedgerEntry::vote_cast(voter.clone(), 250, "10 super votes").unwrap();
        assert!(matches!(
            store.purchase_votes(&contest_id, Tier::Super, 10, allotment, too_expensive),
            Err(StoreError::InsufficientCredits { .. })
        ));
        let allowance = store
            .get_or_create_allowance(&voter, &contest_id, allotment)
            .unwrap();
        assert_eq!(allowance.remaining, TierCounts::new(1, 2, 0));
        assert_eq!(store.sum_for_user(&voter).unwrap(), 80);
    }

    #[test]
    fn settlement_applies_once() {
        let (store, _dir) = create_test_store();
        let user_id = user("payer");

        let first = store
            .settle_payment(
                "cs_live_1",
                LedgerEntry::purchase(user_id.clone(), 100, "cs_live_1").unwrap(),
            )
            .unwrap();
        let second = store
            .settle_payment(
                "cs_live_1",
                LedgerEntry::purchase(user_id.clone(), 100, "cs_live_1").unwrap(),
            )
            .unwrap();

        assert!(first.applied);
        assert!(!second.applied);
        assert_eq!(first.record, second.record);
        assert_eq!(first.record.balance_after, 100);
        assert_eq!(store.get_account(&user_id).unwrap().unwrap().credit_balance, 100);
        assert_eq!(
            store.get_settlement("cs_live_1").unwrap(),
            Some(first.record)
        );
    }

    #[test]
    fn concurrent_settlement_credits_once() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let entry = LedgerEntry::purchase(user("payer"), 100, "cs_race").unwrap();
                    store.settle_payment("cs_race", entry)
                })
            })
            .collect();

        let applied = handles
            .into_iter()
            .filter_map(|handle| handle.join().unwrap().ok())
            .filter(|outcome| outcome.applied)
            .count();

        assert_eq!(applied, 1);
        assert_eq!(store.sum_for_user(&user("payer")).unwrap(), 100);
    }

    #[test]
    fn views_count_once_per_client_per_day() {
        let (store, _dir) = create_test_store();
        let content_id = ContentId::new("story-9").unwrap();
        let day1 = Utc::now() - chrono::Duration::days(1);
        let day2 = Utc::now();

        let fp = ViewFingerprint::new(content_id.clone(), "10.0.0.1", day1);
        assert!(store.record_view(&fp).unwrap().counted);
        let repeat = store.record_view(&fp).unwrap();
        assert!(!repeat.counted);
        assert_eq!(repeat.views, 1);

        let other_client = ViewFingerprint::new(content_id.clone(), "10.0.0.2", day1);
        assert_eq!(store.record_view(&other_client).unwrap().views, 2);

        let next_day = ViewFingerprint::new(content_id.clone(), "10.0.0.1", day2);
        assert_eq!(store.record_view(&next_day).unwrap().views, 3);

        let removed = store.purge_fingerprints_before(day2.date_naive()).unwrap();
        assert_eq!(removed, 2);
        // Today's fingerprint survives the purge.
        assert!(!store.record_view(&next_day).unwrap().counted);

        let stats = store.get_content_stats(&content_id).unwrap().unwrap();
        assert_eq!(stats.views, 3);
    }

    #[test]
    fn submissions_are_scoped_to_their_contest() {
        let (store, _dir) = create_test_store();
        let (contest_id, submission_id) = seed_contest(&store);

        let duplicate = Submission::new(
            submission_id.clone(),
            contest_id.clone(),
            user("author"),
            "Again".to_string(),
        );
        assert!(matches!(
            store.create_submission(&duplicate),
            Err(StoreError::AlreadyExists { .. })
        ));

        let other_contest = ContestId::new("spring-2026-b").unwrap();
        let elsewhere = Submission::new(
            SubmissionId::new("story-2").unwrap(),
            other_contest.clone(),
            user("author"),
            "Elsewhere".to_string(),
        );
        store.create_submission(&elsewhere).unwrap();

        let listed = store.list_submissions(&contest_id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, submission_id);
        assert_eq!(listed[0].votes, VoteTotals::default());
        assert_eq!(store.list_submissions(&other_contest).unwrap().len(), 1);
    }

    #[test]
    fn contest_roundtrip() {
        let (store, _dir) = create_test_store();
        let now = Utc::now();
        let contest = Contest {
            id: ContestId::new("summer").unwrap(),
            title: "Summer Shorts".to_string(),
            voting_opens_at: now,
            voting_closes_at: now + chrono::Duration::days(7),
            created_at: now,
        };
        store.put_contest(&contest).unwrap();
        assert_eq!(store.get_contest(&contest.id).unwrap(), Some(contest));
        assert!(store
            .get_contest(&ContestId::new("winter").unwrap())
            .unwrap()
            .is_none());
    }
}
