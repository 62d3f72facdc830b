//! Common test utilities for storyvault integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use tempfile::TempDir;

use storyvault_core::{
    Contest, ContestId, LedgerEntry, PaymentSession, PaymentStatus, Submission, SubmissionId,
    UserId,
};
use storyvault_service::{
    create_router, AliasResolver, AppState, AuthError, IdentityVerifier, PaymentError,
    PaymentProcessor, ServiceConfig, VerifiedIdentity,
};
use storyvault_store::{RocksStore, Store};

/// Admin key accepted by the test service.
pub const ADMIN_KEY: &str = "test-admin-key";

/// Stripe webhook secret of the test service.
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Legacy uid that the alias table maps onto [`CANONICAL_UID`].
pub const LEGACY_UID: &str = "legacy-uid";

/// Canonical uid of [`LEGACY_UID`].
pub const CANONICAL_UID: &str = "canonical-uid";

/// Accepts `test:<uid>` tokens.
pub struct StaticVerifier;

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let uid = token
            .strip_prefix("test:")
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| AuthError::InvalidToken("not a test token".into()))?;
        Ok(VerifiedIdentity {
            uid: uid.to_string(),
            email: Some(format!("{uid}@example.test")),
        })
    }
}

/// In-memory payment processor.
#[derive(Default)]
pub struct FakeProcessor {
    sessions: Mutex<HashMap<String, PaymentSession>>,
    calls: Mutex<usize>,
}

impl FakeProcessor {
    /// Register a session.
    pub fn add_session(
        &self,
        session_id: &str,
        user: &str,
        status: PaymentStatus,
        credits: Option<i64>,
        amount_total: Option<i64>,
    ) {
        self.sessions.lock().unwrap().insert(
            session_id.to_string(),
            PaymentSession {
                session_id: session_id.to_string(),
                status,
                amount_total,
                client_reference_id: Some(user.to_string()),
                credits_amount: credits,
            },
        );
    }

    /// Register a paid session worth `credits`.
    pub fn add_paid(&self, session_id: &str, user: &str, credits: i64) {
        self.add_session(
            session_id,
            user,
            PaymentStatus::Paid,
            Some(credits),
            Some(credits * 10),
        );
    }

    /// Number of lookups so far.
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn fetch_session(&self, session_id: &str) -> Result<PaymentSession, PaymentError> {
        *self.calls.lock().unwrap() += 1;
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.to_string()))
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct store access for seeding and assertions.
    pub store: Arc<RocksStore>,
    /// The fake payment processor.
    pub processor: Arc<FakeProcessor>,
    /// The application state behind the server.
    pub state: AppState,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));
        let processor = Arc::new(FakeProcessor::default());

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            admin_api_key: Some(ADMIN_KEY.to_string()),
            stripe_webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            ..ServiceConfig::default()
        };

        let aliases = AliasResolver::new(HashMap::from([(
            LEGACY_UID.to_string(),
            CANONICAL_UID.to_string(),
        )]));

        let state = AppState::new(store.clone(), config)
            .with_verifier(Arc::new(StaticVerifier))
            .with_aliases(aliases)
            .with_payment_processor(processor.clone());

        let router: Router = create_router(state.clone());
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            processor,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Authorization header for `uid`.
    pub fn auth(uid: &str) -> String {
        format!("Bearer test:{uid}")
    }

    /// Create a contest whose voting window contains now.
    pub fn open_contest(&self, id: &str) -> ContestId {
        let now = Utc::now();
        self.put_contest(id, now - Duration::hours(1), now + Duration::days(7))
    }

    /// Create a contest whose voting window has passed.
    pub fn closed_contest(&self, id: &str) -> ContestId {
        let now = Utc::now();
        self.put_contest(id, now - Duration::days(14), now - Duration::days(7))
    }

    fn put_contest(
        &self,
        id: &str,
        opens: chrono::DateTime<Utc>,
        closes: chrono::DateTime<Utc>,
    ) -> ContestId {
        let contest = Contest {
            id: ContestId::new(id).unwrap(),
            title: format!("Contest {id}"),
            voting_opens_at: opens,
            voting_closes_at: closes,
            created_at: Utc::now(),
        };
        self.store.put_contest(&contest).unwrap();
        contest.id
    }

    /// Enter a story into a contest.
    pub fn submission(&self, contest_id: &ContestId, id: &str) -> SubmissionId {
        let submission = Submission::new(
            SubmissionId::new(id).unwrap(),
            contest_id.clone(),
            UserId::new("author").unwrap(),
            format!("Story {id}"),
        );
        self.store.create_submission(&submission).unwrap();
        submission.id
    }

    /// Give `uid` some credits.
    pub fn grant(&self, uid: &str, credits: i64) {
        let entry = LedgerEntry::admin_grant(UserId::new(uid).unwrap(), credits, "test grant")
            .unwrap();
        self.store.append_entry(entry).unwrap();
    }

    /// Ledger sum of `uid`.
    pub fn ledger_sum(&self, uid: &str) -> i64 {
        self.store.sum_for_user(&UserId::new(uid).unwrap()).unwrap()
    }

    /// Cached balance of `uid`.
    pub fn cached_balance(&self, uid: &str) -> i64 {
        self.store
            .get_account(&UserId::new(uid).unwrap())
            .unwrap()
            .map_or(0, |a| a.credit_balance)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
