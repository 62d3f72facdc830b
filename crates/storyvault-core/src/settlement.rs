//! Payment settlement types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntryId, UserId};

/// Proof that a payment session has been converted into credits.
///
/// Keyed by the external session id; a second settlement attempt for the same
/// session returns this record instead of crediting again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    /// External payment session id.
    pub session_id: String,
    /// The credited user.
    pub user_id: UserId,
    /// The ledger entry that applied the credits.
    pub entry_id: EntryId,
    /// Credits applied.
    pub credits: i64,
    /// Balance right after the credits were applied.
    pub balance_after: i64,
    /// When the session was settled.
    pub settled_at: DateTime<Utc>,
}

/// Payment state reported by the payment processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Funds captured.
    Paid,
    /// Session exists but is not paid.
    Unpaid,
    /// The processor returned a state we do not recognise.
    Unknown,
}

impl PaymentStatus {
    /// Map a processor status string (`paid`, `unpaid`, `no_payment_required`, ...).
    #[must_use]
    pub fn from_processor(status: &str) -> Self {
        match status {
            "paid" => Self::Paid,
            "unpaid" => Self::Unpaid,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Paid => "paid",
            Self::Unpaid => "unpaid",
            Self::Unknown => "unknown",
        })
    }
}

/// The processor's view of a checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    /// Session id.
    pub session_id: String,
    /// Payment state.
    pub status: PaymentStatus,
    /// Total charged, in the smallest currency unit.
    pub amount_total: Option<i64>,
    /// Our user id, when the session was created with one.
    pub client_reference_id: Option<String>,
    /// Credits recorded in the session metadata at checkout time.
    pub credits_amount: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_processor_strings() {
        assert_eq!(PaymentStatus::from_processor("paid"), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::from_processor("unpaid"), PaymentStatus::Unpaid);
        assert_eq!(
            PaymentStatus::from_processor("no_payment_required"),
            PaymentStatus::Unknown
        );
    }
}
