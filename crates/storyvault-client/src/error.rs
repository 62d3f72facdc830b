//! Client error types.

use storyvault_core::Tier;

/// Errors that can occur when using the StoryVault client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// The identity token was missing or rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// The requested resource does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Server message.
        message: String,
    },

    /// Insufficient credits.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// No votes of the tier are left.
    #[error("no {tier} votes left")]
    AllowanceExhausted {
        /// The exhausted tier.
        tier: Tier,
    },

    /// The contest is outside its voting window.
    #[error("contest not votable: {message}")]
    ContestNotVotable {
        /// Server message.
        message: String,
    },

    /// The payment session has not been paid.
    #[error("payment not confirmed: {status}")]
    PaymentNotConfirmed {
        /// Processor payment status.
        status: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 503 || *status == 502,
            _ => false,
        }
    }
}
