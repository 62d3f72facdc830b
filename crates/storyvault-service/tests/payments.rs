//! Payment settlement integration tests: verify-session and Stripe webhooks.

mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{TestHarness, CANONICAL_UID, LEGACY_UID, WEBHOOK_SECRET};
use serde_json::json;

use storyvault_core::PaymentStatus;
use storyvault_service::stripe::sign_webhook_payload;

fn checkout_completed(session_id: &str, user: &str, payment_status: &str, credits: i64) -> String {
    json!({
        "id": format!("evt_{session_id}"),
        "type": "checkout.session.completed",
        "created": Utc::now().timestamp(),
        "data": {
            "object": {
                "id": session_id,
                "object": "checkout.session",
                "payment_status": payment_status,
                "status": "complete",
                "amount_total": credits * 10,
                "client_reference_id": user,
                "metadata": { "user_id": user, "credits_amount": credits.to_string() }
            }
        }
    })
    .to_string()
}

// ============================================================================
// Verify session
// ============================================================================

#[tokio::test]
async fn verify_session_applies_credits_once() {
    let harness = TestHarness::new();
    harness.processor.add_paid("cs_test_1", "alice", 100);

    let response = harness
        .server
        .post("/v1/payments/verify-session")
        .add_header("authorization", TestHarness::auth("alice"))
        .json(&json!({ "session_id": "cs_test_1" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["applied"], true);
    assert_eq!(body["credits"], 100);
    assert_eq!(body["new_balance"], 100);
    let entry_id = body["entry_id"].clone();

    let response = harness
        .server
        .post("/v1/payments/verify-session")
        .add_header("authorization", TestHarness::auth("alice"))
        .json(&json!({ "session_id": "cs_test_1" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["applied"], false);
    assert_eq!(body["new_balance"], 100);
    assert_eq!(body["entry_id"], entry_id);

    assert_eq!(harness.ledger_sum("alice"), 100);
    assert_eq!(harness.processor.calls(), 1);
}

#[tokio::test]
async fn verify_unpaid_session_fails() {
    let harness = TestHarness::new();
    harness.processor.add_session(
        "cs_unpaid",
        "alice",
        PaymentStatus::Unpaid,
        Some(100),
        Some(1000),
    );

    let response = harness
        .server
        .post("/v1/payments/verify-session")
        .add_header("authorization", TestHarness::auth("alice"))
        .json(&json!({ "session_id": "cs_unpaid" }))
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "payment_not_confirmed");
    assert_eq!(harness.ledger_sum("alice"), 0);
}

#[tokio::test]
async fn verify_someone_elses_session_is_forbidden() {
    let harness = TestHarness::new();
    harness.processor.add_paid("cs_alice", "alice", 100);

    harness
        .server
        .post("/v1/payments/verify-session")
        .add_header("authorization", TestHarness::auth("mallory"))
        .json(&json!({ "session_id": "cs_alice" }))
        .await
        .assert_status_forbidden();

    assert_eq!(harness.ledger_sum("mallory"), 0);
    assert_eq!(harness.ledger_sum("alice"), 0);
}

#[tokio::test]
async fn verify_session_under_legacy_uid_credits_canonical_user() {
    let harness = TestHarness::new();
    harness.processor.add_paid("cs_legacy", LEGACY_UID, 30);

    harness
        .server
        .post("/v1/payments/verify-session")
        .add_header("authorization", TestHarness::auth(LEGACY_UID))
        .json(&json!({ "session_id": "cs_legacy" }))
        .await
        .assert_status_ok();

    assert_eq!(harness.ledger_sum(CANONICAL_UID), 30);
    assert_eq!(harness.ledger_sum(LEGACY_UID), 0);
}

#[tokio::test]
async fn verify_unknown_session_fails() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/v1/payments/verify-session")
        .add_header("authorization", TestHarness::auth("alice"))
        .json(&json!({ "session_id": "cs_nope" }))
        .await
        .assert_status_not_found();
}

// ============================================================================
// Webhooks
// ============================================================================

#[tokio::test]
async fn webhook_settles_paid_checkout() {
    let harness = TestHarness::new();
    let payload = checkout_completed("cs_hook", "alice", "paid", 50);
    let signature = sign_webhook_payload(WEBHOOK_SECRET, &payload, Utc::now().timestamp());

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", signature)
        .text(payload)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["received"], true);
    assert_eq!(body["applied"], true);
    assert_eq!(harness.ledger_sum("alice"), 50);
    assert_eq!(harness.processor.calls(), 0);
}

#[tokio::test]
async fn webhook_and_verify_session_settle_once() {
    let harness = TestHarness::new();
    harness.processor.add_paid("cs_race", "alice", 50);

    let payload = checkout_completed("cs_race", "alice", "paid", 50);
    let signature = sign_webhook_payload(WEBHOOK_SECRET, &payload, Utc::now().timestamp());
    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", signature)
        .text(payload)
        .await
        .assert_status_ok();

    let response = harness
        .server
        .post("/v1/payments/verify-session")
        .add_header("authorization", TestHarness::auth("alice"))
        .json(&json!({ "session_id": "cs_race" }))
        .await;

    let body: serde_json::Value = response.json();
    assert_eq!(body["applied"], false);
    assert_eq!(body["new_balance"], 50);
    assert_eq!(harness.ledger_sum("alice"), 50);
}

#[tokio::test]
async fn webhook_ignores_unpaid_checkout() {
    let harness = TestHarness::new();
    let payload = checkout_completed("cs_pending", "alice", "unpaid", 50);
    let signature = sign_webhook_payload(WEBHOOK_SECRET, &payload, Utc::now().timestamp());

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", signature)
        .text(payload)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body.get("applied").is_none());
    assert_eq!(harness.ledger_sum("alice"), 0);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let harness = TestHarness::new();
    let payload = checkout_completed("cs_forged", "alice", "paid", 5000);
    let signature = sign_webhook_payload("whsec_wrong", &payload, Utc::now().timestamp());

    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", signature)
        .text(payload)
        .await
        .assert_status_bad_request();

    assert_eq!(harness.ledger_sum("alice"), 0);
}

#[tokio::test]
async fn webhook_without_signature_is_rejected() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/webhooks/stripe")
        .text(checkout_completed("cs_unsigned", "alice", "paid", 50))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn webhook_acknowledges_unrelated_events() {
    let harness = TestHarness::new();
    let payload = json!({
        "id": "evt_other",
        "type": "customer.created",
        "data": { "object": { "id": "cus_123" } }
    })
    .to_string();
    let signature = sign_webhook_payload(WEBHOOK_SECRET, &payload, Utc::now().timestamp());

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", signature)
        .text(payload)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["received"], true);
}
