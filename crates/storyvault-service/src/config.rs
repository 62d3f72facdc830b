//! Service configuration.

use std::path::Path;

use serde::Deserialize;
use storyvault_core::{parse_tier_counts, TierCounts, VotingConfig};
use storyvault_store::DEFAULT_LOCK_TIMEOUT_MS;

/// Google's public keys for Firebase ID tokens.
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Stripe REST API base URL.
pub const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/storyvault").
    pub data_dir: String,

    /// Firebase project id; the expected token audience.
    pub firebase_project_id: String,

    /// JWKS endpoint for identity token keys.
    pub jwks_url: String,

    /// Admin API key for privileged endpoints.
    pub admin_api_key: Option<String>,

    /// Stripe API key (optional).
    pub stripe_api_key: Option<String>,

    /// Stripe webhook secret (optional).
    pub stripe_webhook_secret: Option<String>,

    /// Stripe API base URL.
    pub stripe_api_base: String,

    /// Frontend URL for checkout redirects.
    pub frontend_url: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// JSON file mapping legacy user ids onto canonical ones.
    pub identity_aliases_path: Option<String>,

    /// How many times an operation is attempted when storage is contended.
    pub conflict_retry_attempts: u32,

    /// Timeout for payment processor calls, in seconds.
    pub payment_timeout_seconds: u64,

    /// How long a storage transaction waits for a row lock, in milliseconds.
    pub lock_timeout_ms: i64,

    /// Tier weights, default allotment and vote prices.
    pub voting: VotingConfig,

    /// Payment amount (in cents) that buys one credit.
    pub cents_per_credit: i64,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // Try to load Stripe secrets from file first, then fall back to env vars
        let (stripe_api_key, stripe_webhook_secret) = load_stripe_secrets();

        let firebase_project_id =
            std::env::var("FIREBASE_PROJECT_ID").unwrap_or(defaults.firebase_project_id);

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            firebase_project_id,
            jwks_url: std::env::var("JWKS_URL").unwrap_or(defaults.jwks_url),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            stripe_api_key,
            stripe_webhook_secret,
            stripe_api_base: std::env::var("STRIPE_API_BASE").unwrap_or(defaults.stripe_api_base),
            frontend_url: std::env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
            identity_aliases_path: std::env::var("IDENTITY_ALIASES_PATH").ok(),
            conflict_retry_attempts: env_parse("CONFLICT_RETRY_ATTEMPTS")
                .unwrap_or(defaults.conflict_retry_attempts),
            payment_timeout_seconds: env_parse("PAYMENT_TIMEOUT_SECONDS")
                .unwrap_or(defaults.payment_timeout_seconds),
            lock_timeout_ms: env_parse("LOCK_TIMEOUT_MS").unwrap_or(defaults.lock_timeout_ms),
            voting: VotingConfig {
                weights: env_tier_counts("VOTE_WEIGHTS", defaults.voting.weights),
                default_allowance: env_tier_counts(
                    "DEFAULT_ALLOWANCE",
                    defaults.voting.default_allowance,
                ),
                prices: env_tier_counts("VOTE_PRICES", defaults.voting.prices),
            },
            cents_per_credit: env_parse::<i64>("CENTS_PER_CREDIT")
                .filter(|cents| *cents > 0)
                .unwrap_or(defaults.cents_per_credit),
        }
    }
}

/// Parse an environment variable, ignoring it when unset or malformed.
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = %name, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}

/// Read a `free,premium,super` triple from the environment.
fn env_tier_counts(name: &str, default: TierCounts) -> TierCounts {
    let Ok(raw) = std::env::var(name) else {
        return default;
    };
    parse_tier_counts(&raw).unwrap_or_else(|e| {
        tracing::warn!(variable = %name, error = %e, "Using default tier values");
        default
    })
}

/// Load Stripe secrets from file or environment.
fn load_stripe_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [".secrets/stripe.json", "../.secrets/stripe.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return (Some(secrets.api_key), secrets.webhook_secret);
        }
    }

    // Fall back to environment variables
    tracing::debug!("Stripe secrets file not found, using environment variables");
    (
        std::env::var("STRIPE_API_KEY").ok(),
        std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/storyvault".into(),
            firebase_project_id: "storyvault".into(),
            jwks_url: FIREBASE_JWKS_URL.into(),
            admin_api_key: None,
            stripe_api_key: None,
            stripe_webhook_secret: None,
            stripe_api_base: STRIPE_API_BASE.into(),
            frontend_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            identity_aliases_path: None,
            conflict_retry_attempts: 3,
            payment_timeout_seconds: 10,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            voting: VotingConfig::default(),
            cents_per_credit: 10,
        }
    }
}
