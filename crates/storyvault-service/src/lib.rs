//! StoryVault HTTP API Service.
//!
//! This crate provides the HTTP API for the credit ledger and contest voting
//! service, including:
//!
//! - Account registration and credit balances
//! - Contest submissions, vote admission and leaderboards
//! - Payment settlement (client verification, admin and Stripe webhooks)
//! - De-duplicated view counting
//!
//! # Authentication
//!
//! 1. **Firebase ID tokens** - For end-user requests, verified against
//!    Google's published keys and mapped through the identity alias table
//! 2. **Admin API key** - For privileged endpoints (`X-Admin-Key`)

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers need async for the router

pub mod auth;
pub mod balance;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod retry;
pub mod routes;
pub mod settlement;
pub mod state;
pub mod stripe;
pub mod views;
pub mod voting;

pub use auth::{AliasResolver, AuthError, FirebaseVerifier, IdentityVerifier, VerifiedIdentity};
pub use balance::{BalanceAudit, BalanceProjector};
pub use config::ServiceConfig;
pub use error::ApiError;
pub use retry::RetryPolicy;
pub use routes::create_router;
pub use settlement::{PaymentError, PaymentProcessor, PaymentReconciler, Settlement};
pub use state::AppState;
pub use stripe::{StripeClient, StripeError};
pub use views::ViewGate;
pub use voting::VoteAdmission;
