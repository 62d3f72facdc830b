//! Stripe integration for payments and customer management.
//!
//! Stripe handles:
//! - Customer registration
//! - Credit purchases via Checkout
//! - Session status lookups for settlement
//! - Webhook signatures

pub mod client;
pub mod types;

pub use client::{
    is_checkout_session_id, sign_webhook_payload, verify_webhook_signature, CheckoutRequest,
    StripeClient, StripeError,
};
pub use types::*;
