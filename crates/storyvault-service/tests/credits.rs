//! Credit balance and ledger integration tests.

mod common;

use common::TestHarness;
use serde_json::json;

// ============================================================================
// Balance
// ============================================================================

#[tokio::test]
async fn get_balance_success() {
    let harness = TestHarness::new();
    harness.grant("alice", 25);

    let response = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", TestHarness::auth("alice"))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["user_id"], "alice");
    assert_eq!(body["credit_balance"], 25);
    assert!(body["last_entry_id"].is_string());
}

#[tokio::test]
async fn get_balance_without_account_fails() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", TestHarness::auth("alice"))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn get_balance_without_auth_fails() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/v1/credits/balance")
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn balance_matches_ledger_after_many_grants() {
    let harness = TestHarness::new();
    for credits in [5, 10, 15, 20] {
        harness.grant("alice", credits);
    }

    let response = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", TestHarness::auth("alice"))
        .await;

    let body: serde_json::Value = response.json();
    assert_eq!(body["credit_balance"], 50);
    assert_eq!(harness.ledger_sum("alice"), 50);
    assert_eq!(harness.cached_balance("alice"), 50);
}

// ============================================================================
// Ledger
// ============================================================================

#[tokio::test]
async fn list_ledger_empty() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/credits/ledger")
        .add_header("authorization", TestHarness::auth("alice"))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body["entries"].as_array().unwrap().is_empty());
    assert_eq!(body["has_more"], false);
}

#[tokio::test]
async fn list_ledger_newest_first_with_pagination() {
    let harness = TestHarness::new();
    for credits in [1, 2, 3] {
        harness.grant("alice", credits);
    }

    let response = harness
        .server
        .get("/v1/credits/ledger?limit=2")
        .add_header("authorization", TestHarness::auth("alice"))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(body["has_more"], true);
    assert_eq!(entries[0]["amount"], 3);
    assert_eq!(entries[0]["balance_after"], 6);
    assert_eq!(entries[0]["reason"], "admin-grant");
    assert_eq!(entries[1]["amount"], 2);

    let response = harness
        .server
        .get("/v1/credits/ledger?limit=2&offset=2")
        .add_header("authorization", TestHarness::auth("alice"))
        .await;

    let body: serde_json::Value = response.json();
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["amount"], 1);
    assert_eq!(body["has_more"], false);
}

#[tokio::test]
async fn ledger_is_private_to_its_owner() {
    let harness = TestHarness::new();
    harness.grant("alice", 10);

    let response = harness
        .server
        .get("/v1/credits/ledger")
        .add_header("authorization", TestHarness::auth("bob"))
        .await;

    let body: serde_json::Value = response.json();
    assert!(body["entries"].as_array().unwrap().is_empty());
}

// ============================================================================
// Purchase
// ============================================================================

#[tokio::test]
async fn purchase_rejects_out_of_range_amounts() {
    let harness = TestHarness::new();

    for credits in [0, 9, 100_001] {
        harness
            .server
            .post("/v1/credits/purchase")
            .add_header("authorization", TestHarness::auth("alice"))
            .json(&json!({ "credits": credits }))
            .await
            .assert_status_bad_request();
    }
}

#[tokio::test]
async fn purchase_without_stripe_is_bad_gateway() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/credits/purchase")
        .add_header("authorization", TestHarness::auth("alice"))
        .json(&json!({ "credits": 100 }))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "external_service_error");
}
