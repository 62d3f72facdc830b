//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Account records (cached balance projection), keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Ledger entries, keyed by `entry_id` (ULID).
    pub const LEDGER: &str = "ledger";

    /// Index: ledger entries by user, keyed by `user_id || entry_id`.
    /// Value is empty (index only).
    pub const LEDGER_BY_USER: &str = "ledger_by_user";

    /// Index: idempotency, keyed by `user_id || external_ref`, value `entry_id`.
    pub const LEDGER_REFS: &str = "ledger_refs";

    /// Contest records, keyed by `contest_id`.
    pub const CONTESTS: &str = "contests";

    /// Submissions with their vote tallies, keyed by `contest_id || submission_id`.
    pub const SUBMISSIONS: &str = "submissions";

    /// Vote allowances, keyed by `user_id || contest_id`.
    pub const ALLOWANCES: &str = "allowances";

    /// Vote records, keyed by `contest_id || submission_id || vote_id`.
    pub const VOTES: &str = "votes";

    /// Payment settlement records, keyed by payment session id.
    pub const SETTLEMENTS: &str = "settlements";

    /// View fingerprints, keyed by `YYYYMMDD || sha256`.
    pub const VIEW_FINGERPRINTS: &str = "view_fingerprints";

    /// View counters, keyed by `content_id`.
    pub const CONTENT_STATS: &str = "content_stats";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::LEDGER,
        cf::LEDGER_BY_USER,
        cf::LEDGER_REFS,
        cf::CONTESTS,
        cf::SUBMISSIONS,
        cf::ALLOWANCES,
        cf::VOTES,
        cf::SETTLEMENTS,
        cf::VIEW_FINGERPRINTS,
        cf::CONTENT_STATS,
    ]
}
