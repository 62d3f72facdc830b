//! Authentication: identity verification and request extractors.
//!
//! This module provides:
//! - `IdentityVerifier` - bearer token to identity, with the Firebase
//!   implementation `FirebaseVerifier`
//! - `AliasResolver` - maps legacy user ids onto canonical ones
//! - `AuthUser` - extractor for end-user requests
//! - `AdminAuth` - extractor for privileged endpoints

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

use storyvault_core::UserId;

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Constants
// ============================================================================

/// How long to cache JWKS keys before refreshing.
const JWKS_CACHE_DURATION: Duration = Duration::from_secs(3600);

/// Timeout for JWKS fetch requests.
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Issuer prefix of Firebase ID tokens.
const FIREBASE_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

// ============================================================================
// Identity Verification
// ============================================================================

/// Errors from identity verification.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token is malformed, expired, or signed by an unknown key.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The signing keys could not be fetched.
    #[error("signing keys unavailable: {0}")]
    KeysUnavailable(String),
}

/// The identity behind a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Identity provider user id.
    pub uid: String,
    /// Email claim, if present.
    pub email: Option<String>,
}

/// Verifies bearer tokens.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify `token` and return the identity it carries.
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError>;
}

/// Firebase ID token claims.
#[derive(Debug, Clone, Deserialize)]
struct FirebaseClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

/// JWKS (JSON Web Key Set) response structure.
#[derive(Debug, Clone, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

/// Single JSON Web Key.
#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

/// Cached decoding keys, mapped by kid.
struct JwksCache {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
}

impl JwksCache {
    fn is_fresh(&self) -> bool {
        self.fetched_at
            .is_some_and(|at| at.elapsed() < JWKS_CACHE_DURATION)
    }
}

/// Verifies Firebase ID tokens (RS256) against Google's published keys.
///
/// Keys are cached inside the verifier and refreshed hourly or when a token
/// names an unknown kid.
pub struct FirebaseVerifier {
    client: reqwest::Client,
    jwks_url: String,
    project_id: String,
    cache: RwLock<JwksCache>,
}

impl FirebaseVerifier {
    /// Create a verifier for tokens issued to `project_id`.
    #[must_use]
    pub fn new(project_id: impl Into<String>, jwks_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            jwks_url: jwks_url.into(),
            project_id: project_id.into(),
            cache: RwLock::new(JwksCache {
                keys: HashMap::new(),
                fetched_at: None,
            }),
        }
    }

    /// Get a decoding key from cache or refresh the JWKS.
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let cache = self.cache.read().await;
            if cache.is_fresh() {
                if let Some(key) = cache.keys.get(kid) {
                    return Ok(key.clone());
                }
            }
        }

        let jwks = self.fetch_jwks().await?;

        let mut cache = self.cache.write().await;
        cache.keys = jwks
            .keys
            .iter()
            .filter_map(|jwk| Some((jwk.kid.clone()?, jwk_to_decoding_key(jwk)?)))
            .collect();
        cache.fetched_at = Some(Instant::now());

        cache
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::InvalidToken(format!("unknown signing key {kid}")))
    }

    async fn fetch_jwks(&self) -> Result<Jwks, AuthError> {
        tracing::debug!(url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::KeysUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeysUnavailable(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| AuthError::KeysUnavailable(e.to_string()))?;

        tracing::info!(keys_count = jwks.keys.len(), "JWKS fetched successfully");
        Ok(jwks)
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing kid".into()))?;

        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!("{FIREBASE_ISSUER_PREFIX}{}", self.project_id)]);

        let claims = decode::<FirebaseClaims>(token, &key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?
            .claims;

        if claims.sub.is_empty() {
            return Err(AuthError::InvalidToken("empty subject".into()));
        }

        Ok(VerifiedIdentity {
            uid: claims.sub,
            email: claims.email,
        })
    }
}

/// Convert a JWK to a `DecodingKey`.
fn jwk_to_decoding_key(jwk: &Jwk) -> Option<DecodingKey> {
    if jwk.kty != "RSA" {
        tracing::debug!(kty = %jwk.kty, "Skipping non-RSA JWK");
        return None;
    }

    let n = jwk.n.as_ref()?;
    let e = jwk.e.as_ref()?;

    DecodingKey::from_rsa_components(n, e).ok()
}

// ============================================================================
// Identity Aliases
// ============================================================================

/// Errors loading the alias file.
#[derive(Debug, thiserror::Error)]
pub enum AliasError {
    /// The file could not be read.
    #[error("failed to read aliases: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a JSON object of strings.
    #[error("failed to parse aliases: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Maps legacy user ids onto the canonical id of the same person.
///
/// Applied once, right after token verification, so every component sees
/// canonical ids only.
#[derive(Debug, Clone, Default)]
pub struct AliasResolver {
    aliases: HashMap<String, String>,
}

impl AliasResolver {
    /// Build a resolver from `legacy -> canonical` pairs.
    #[must_use]
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self { aliases }
    }

    /// Load a JSON object of `"legacy": "canonical"` pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AliasError> {
        let contents = std::fs::read_to_string(path)?;
        let aliases: HashMap<String, String> = serde_json::from_str(&contents)?;
        Ok(Self::new(aliases))
    }

    /// The canonical id for `uid`.
    #[must_use]
    pub fn resolve<'a>(&'a self, uid: &'a str) -> &'a str {
        self.aliases.get(uid).map_or(uid, String::as_str)
    }

    /// Number of aliases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Whether no aliases are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// An authenticated end user.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The canonical user ID.
    pub user_id: UserId,
    /// Email from the identity token.
    pub email: Option<String>,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let identity = state.verifier.verify(token).await.map_err(|e| match e {
            AuthError::InvalidToken(reason) => {
                tracing::debug!(reason = %reason, "Rejected bearer token");
                ApiError::Unauthorized
            }
            AuthError::KeysUnavailable(reason) => {
                tracing::error!(reason = %reason, "Cannot verify bearer token");
                ApiError::ExternalService("Failed to fetch authentication keys".into())
            }
        })?;

        let canonical = state.aliases.resolve(&identity.uid);
        if canonical != identity.uid {
            tracing::debug!(uid = %identity.uid, canonical = %canonical, "Resolved identity alias");
        }

        let user_id = UserId::new(canonical).map_err(|_| ApiError::Unauthorized)?;

        Ok(AuthUser {
            user_id,
            email: identity.email,
        })
    }
}

/// Admin authentication via the `X-Admin-Key` header.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Admin identifier (for audit logging).
    pub admin_id: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let admin_key = parts
            .headers
            .get("x-admin-key")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let expected_key = state
            .config
            .admin_api_key
            .as_ref()
            .ok_or(ApiError::Unauthorized)?;

        if !constant_time_eq(admin_key, expected_key) {
            return Err(ApiError::Unauthorized);
        }

        let admin_id = parts
            .headers
            .get("x-admin-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("admin")
            .to_string();

        tracing::info!(admin_id = %admin_id, "Admin authenticated");

        Ok(AdminAuth { admin_id })
    }
}
