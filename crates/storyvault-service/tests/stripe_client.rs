//! Stripe client tests against a mocked Stripe API.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storyvault_core::PaymentStatus;
use storyvault_service::stripe::CheckoutRequest;
use storyvault_service::{PaymentError, PaymentProcessor, StripeClient};

fn client(server: &MockServer) -> StripeClient {
    StripeClient::new("sk_test_xxx", server.uri(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn fetch_paid_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/checkout/sessions/cs_test_1"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_1",
            "object": "checkout.session",
            "payment_status": "paid",
            "status": "complete",
            "amount_total": 1000,
            "client_reference_id": "alice",
            "metadata": { "user_id": "alice", "credits_amount": "100" }
        })))
        .mount(&server)
        .await;

    let session = client(&server).fetch_session("cs_test_1").await.unwrap();

    assert_eq!(session.status, PaymentStatus::Paid);
    assert_eq!(session.credits_amount, Some(100));
    assert_eq!(session.amount_total, Some(1000));
    assert_eq!(session.client_reference_id.as_deref(), Some("alice"));
}

#[tokio::test]
async fn missing_session_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/checkout/sessions/cs_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "type": "invalid_request_error",
                "code": "resource_missing",
                "message": "No such checkout.session: 'cs_missing'"
            }
        })))
        .mount(&server)
        .await;

    let result = client(&server).fetch_session("cs_missing").await;

    assert!(matches!(result, Err(PaymentError::SessionNotFound(_))));
}

#[tokio::test]
async fn malformed_session_ids_never_reach_stripe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "cus_1" })))
        .expect(0)
        .mount(&server)
        .await;
    let stripe = client(&server);

    for session_id in ["cs_1/../../customers/cus_1", "cs_1?expand[]=customer", "sess_1", ""] {
        let result = stripe.fetch_session(session_id).await;
        assert!(
            matches!(result, Err(PaymentError::SessionNotFound(_))),
            "{session_id}"
        );
    }
}

#[tokio::test]
async fn server_errors_are_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/checkout/sessions/cs_test_1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = client(&server).fetch_session("cs_test_1").await;

    assert!(matches!(result, Err(PaymentError::Unavailable(_))));
}

#[tokio::test]
async fn create_checkout_session_sends_idempotency_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkout/sessions"))
        .and(header_exists("idempotency-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_new",
            "url": "https://checkout.stripe.com/c/pay/cs_new",
            "payment_status": "unpaid",
            "client_reference_id": "alice",
            "metadata": { "credits_amount": "50" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = client(&server)
        .create_checkout_session(&CheckoutRequest {
            customer_id: None,
            user_id: "alice",
            amount_cents: 500,
            credits_amount: 50,
            success_url: "http://localhost:3000/credits/success",
            cancel_url: "http://localhost:3000/credits/cancel",
        })
        .await
        .unwrap();

    assert_eq!(session.id, "cs_new");
    assert_eq!(session.credits_amount(), Some(50));
}
