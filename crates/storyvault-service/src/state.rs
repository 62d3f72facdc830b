//! Application state.

use std::sync::Arc;
use std::time::Duration;

use storyvault_store::Store;

use crate::auth::{AliasResolver, FirebaseVerifier, IdentityVerifier};
use crate::balance::BalanceProjector;
use crate::config::ServiceConfig;
use crate::retry::RetryPolicy;
use crate::settlement::{PaymentProcessor, PaymentReconciler};
use crate::stripe::StripeClient;
use crate::views::ViewGate;
use crate::voting::VoteAdmission;

/// Application state shared across handlers.
///
/// Everything a request needs is built here once at start-up; handlers hold
/// no other state.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Bearer token verifier.
    pub verifier: Arc<dyn IdentityVerifier>,

    /// Legacy user id mapping.
    pub aliases: Arc<AliasResolver>,

    /// Stripe client for customers and checkout (optional).
    pub stripe: Option<Arc<StripeClient>>,

    /// Cached balance reads.
    pub balances: BalanceProjector,

    /// Vote admission and contests.
    pub votes: VoteAdmission,

    /// Payment settlement.
    pub payments: PaymentReconciler,

    /// View counting.
    pub views: ViewGate,
}

impl AppState {
    /// Create the application state with the production collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let verifier: Arc<dyn IdentityVerifier> = Arc::new(FirebaseVerifier::new(
            config.firebase_project_id.clone(),
            config.jwks_url.clone(),
        ));

        // Create Stripe client if configured
        let stripe = config.stripe_api_key.as_ref().and_then(|key| {
            match StripeClient::new(
                key,
                config.stripe_api_base.clone(),
                Duration::from_secs(config.payment_timeout_seconds),
            ) {
                Ok(client) => {
                    tracing::info!("Stripe integration enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Stripe client");
                    None
                }
            }
        });

        if stripe.is_none() {
            tracing::warn!("Stripe not configured - payments will not be available");
        }

        let processor = stripe
            .clone()
            .map(|client| client as Arc<dyn PaymentProcessor>);

        Self::assemble(
            store,
            config,
            verifier,
            Arc::new(AliasResolver::default()),
            stripe,
            processor,
        )
    }

    fn assemble(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        verifier: Arc<dyn IdentityVerifier>,
        aliases: Arc<AliasResolver>,
        stripe: Option<Arc<StripeClient>>,
        processor: Option<Arc<dyn PaymentProcessor>>,
    ) -> Self {
        let retry = RetryPolicy::new(config.conflict_retry_attempts);

        let balances = BalanceProjector::new(store.clone(), retry);
        let votes = VoteAdmission::new(store.clone(), config.voting.clone(), retry);
        let payments = PaymentReconciler::new(
            store.clone(),
            processor,
            aliases.clone(),
            Duration::from_secs(config.payment_timeout_seconds),
            config.cents_per_credit,
            retry,
        );
        let views = ViewGate::new(store.clone(), retry);

        Self {
            store,
            config,
            verifier,
            aliases,
            stripe,
            balances,
            votes,
            payments,
            views,
        }
    }

    /// Replace the token verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Replace the identity alias table.
    #[must_use]
    pub fn with_aliases(self, aliases: AliasResolver) -> Self {
        let processor = self.payments.processor();
        Self::assemble(
            self.store,
            self.config,
            self.verifier,
            Arc::new(aliases),
            self.stripe,
            processor,
        )
    }

    /// Replace the payment processor used for settlement.
    #[must_use]
    pub fn with_payment_processor(self, processor: Arc<dyn PaymentProcessor>) -> Self {
        Self::assemble(
            self.store,
            self.config,
            self.verifier,
            self.aliases,
            self.stripe,
            Some(processor),
        )
    }

    /// Check if Stripe is configured.
    #[must_use]
    pub fn has_stripe(&self) -> bool {
        self.stripe.is_some()
    }
}
