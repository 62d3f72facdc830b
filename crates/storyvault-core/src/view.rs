//! View de-duplication fingerprints.
//!
//! A view is identified by `(content, client, UTC day)`. The fingerprint key is
//! the day followed by a SHA-256 digest of the three parts, so all keys of one
//! day share a prefix and old days can be purged by range.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ContentId;

/// Length of the day prefix (`YYYYMMDD`).
pub const DAY_PREFIX_LEN: usize = 8;

/// A recorded view fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewFingerprint {
    /// Storage key: `YYYYMMDD` followed by the 32-byte digest.
    pub key: Vec<u8>,
    /// The viewed content.
    pub content_id: ContentId,
    /// Calendar day (UTC) of the view.
    pub day: NaiveDate,
    /// When the view was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl ViewFingerprint {
    /// Fingerprint a view at `at`.
    #[must_use]
    pub fn new(content_id: ContentId, client_identifier: &str, at: DateTime<Utc>) -> Self {
        let day = at.date_naive();
        Self {
            key: fingerprint_key(&content_id, client_identifier, day),
            content_id,
            day,
            recorded_at: at,
        }
    }

    /// Hex form of the digest part of the key.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        hex::encode(&self.key[DAY_PREFIX_LEN..])
    }
}

/// Key prefix shared by all fingerprints of `day`.
#[must_use]
pub fn day_prefix(day: NaiveDate) -> [u8; DAY_PREFIX_LEN] {
    let text = format!(
        "{:04}{:02}{:02}",
        day.year().clamp(0, 9999),
        day.month(),
        day.day()
    );
    let mut prefix = [0u8; DAY_PREFIX_LEN];
    prefix.copy_from_slice(text.as_bytes());
    prefix
}

/// Compute the fingerprint key for a view.
///
/// Parts are length-delimited before hashing so `("ab", "c")` and `("a", "bc")`
/// never collide.
#[must_use]
pub fn fingerprint_key(content_id: &ContentId, client_identifier: &str, day: NaiveDate) -> Vec<u8> {
    let prefix = day_prefix(day);
    let mut hasher = Sha256::new();
    for part in [content_id.as_bytes(), client_identifier.as_bytes(), &prefix[..]] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    let mut key = Vec::with_capacity(DAY_PREFIX_LEN + 32);
    key.extend_from_slice(&prefix);
    key.extend_from_slice(&hasher.finalize());
    key
}

/// View counter of a piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStats {
    /// The content.
    pub content_id: ContentId,
    /// Distinct daily views.
    pub views: u64,
    /// When the counter last changed.
    pub updated_at: DateTime<Utc>,
}

impl ContentStats {
    /// A counter at zero.
    #[must_use]
    pub fn new(content_id: ContentId) -> Self {
        Self {
            content_id,
            views: 0,
            updated_at: Utc::now(),
        }
    }
}
