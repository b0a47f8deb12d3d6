//! Reconciliation against a simulated Alma API.
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | GET    | `/v1/payments/{id}` | `ipn_*`, `status_*`, `validate_*` |
//! | POST   | `/v1/payments` | `checkout_*` |
//! | POST   | `/v2/payments/eligibility` | `eligibility_*` |

use alma::hmac::compute_hmac;
use alma::{
    handle_notification, initiate_payment, installment_plan, resolve_status, validate_payment,
    AlmaBridge, ApiMode, BasePaymentData, CheckoutUrls, EligibilityQuery, GatewayConfig,
    InMemoryPaymentRepository, LocalPayment, LocalPaymentState, NotificationRequest,
    PaymentError, PaymentRepository, PaymentStatus, Validation,
};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "sk_test_1Mcp9TgSSd0ZUyI2RazZNyWS";
const PID: &str = "payment_11uPRjP4L9Dgbttx";

fn bridge(server: &MockServer) -> AlmaBridge {
    AlmaBridge::new(GatewayConfig::new(ApiMode::Test, "", KEY).with_api_root(server.uri()))
}

fn alma_record(local_id: i64, amount: i64) -> Value {
    json!({
        "id": PID,
        "state": "in_progress",
        "purchase_amount": amount,
        "expired_at": null,
        "custom_data": {"payment_id": local_id},
        "payment_plan": [
            {"state": "paid", "purchase_amount": amount / 3 + amount % 3},
            {"state": "pending", "purchase_amount": amount / 3},
            {"state": "pending", "purchase_amount": amount / 3}
        ],
        "orders": [{"id": "order_1", "merchant_reference": "000042"}]
    })
}

async fn mount_record(server: &MockServer, body: Value, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/payments/{PID}")))
        .and(header("Authorization", format!("Alma-Auth {KEY}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn signed() -> NotificationRequest {
    NotificationRequest::new(
        Some(PID.to_string()),
        Some(compute_hmac(KEY.as_bytes(), PID.as_bytes())),
    )
}

fn pending_payment(id: i64, amount: i64) -> LocalPayment {
    let mut payment = LocalPayment::new(id, amount, "EUR");
    payment.state = LocalPaymentState::Processing;
    payment.details.payload = Some(json!({"id": PID, "url": "https://checkout", "payment_page_mode": "in_page"}));
    payment
}

// ── IPN ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn ipn_valid_payment_then_status_is_captured() {
    let server = MockServer::start().await;
    mount_record(&server, alma_record(42, 10000), 1).await;
    let bridge = bridge(&server);
    let repo = InMemoryPaymentRepository::new();
    repo.save(pending_payment(42, 10000));

    let ack = handle_notification(&bridge, &repo, 42, signed()).await.unwrap();
    assert!(ack.success);
    assert_eq!(ack.state, Some(true));

    let mut payment = repo.find(42).unwrap();
    assert_eq!(payment.details.payment_id.as_deref(), Some(PID));
    assert_eq!(payment.details.is_valid, Validation::Valid);
    let snapshot = payment.details.payment_data.clone().unwrap();
    assert_eq!(snapshot["orders"][0]["merchant_reference"], json!("000042"));
    assert_eq!(snapshot["orders"][0]["customer_url"], Value::Null);

    // The flag is set: no second fetch.
    let status = resolve_status(&bridge, &mut payment, Some(PID)).await.unwrap();
    assert_eq!(status, PaymentStatus::Captured);
    assert_eq!(payment.state, LocalPaymentState::Captured);
    assert!(!payment.details.has_payload());
}

#[tokio::test]
async fn ipn_amount_mismatch_then_status_is_failed() {
    let server = MockServer::start().await;
    mount_record(&server, alma_record(42, 9999), 1).await;
    let bridge = bridge(&server);
    let repo = InMemoryPaymentRepository::new();
    repo.save(pending_payment(42, 10000));

    let ack = handle_notification(&bridge, &repo, 42, signed()).await.unwrap();
    assert_eq!(ack.state, Some(false));

    let mut payment = repo.find(42).unwrap();
    let status = resolve_status(&bridge, &mut payment, Some(PID)).await.unwrap();
    assert_eq!(status, PaymentStatus::Failed);
    assert_eq!(payment.state, LocalPaymentState::Failed);
}

#[tokio::test]
async fn ipn_for_foreign_payment_leaves_local_payment_untouched() {
    let server = MockServer::start().await;
    mount_record(&server, alma_record(7, 10000), 1).await;
    let bridge = bridge(&server);
    let repo = InMemoryPaymentRepository::new();
    let before = pending_payment(42, 10000);
    repo.save(before.clone());

    let err = handle_notification(&bridge, &repo, 42, signed()).await.unwrap_err();
    assert_eq!(err.status_code(), 500);
    assert_eq!(repo.find(42), Some(before));
}

// ── Status ──────────────────────────────────────────────────────────

#[tokio::test]
async fn status_reconciles_only_once() {
    let server = MockServer::start().await;
    mount_record(&server, alma_record(42, 10000), 1).await;
    let bridge = bridge(&server);
    let mut payment = pending_payment(42, 10000);

    let first = resolve_status(&bridge, &mut payment, Some(PID)).await.unwrap();
    let second = resolve_status(&bridge, &mut payment, Some(PID)).await.unwrap();
    assert_eq!(first, PaymentStatus::Captured);
    assert_eq!(second, PaymentStatus::Captured);
}

#[tokio::test]
async fn status_ownership_mismatch_propagates() {
    let server = MockServer::start().await;
    mount_record(&server, alma_record(7, 10000), 1).await;
    let bridge = bridge(&server);
    let mut payment = pending_payment(42, 10000);
    let before = payment.clone();

    let err = resolve_status(&bridge, &mut payment, Some(PID)).await.unwrap_err();
    assert!(err.is_id_mismatch());
    assert_eq!(payment, before);
}

#[tokio::test]
async fn status_provider_404_is_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/payments/{PID}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let bridge = bridge(&server);
    let mut payment = pending_payment(42, 10000);

    let status = resolve_status(&bridge, &mut payment, Some(PID)).await.unwrap();
    assert_eq!(status, PaymentStatus::Failed);
    assert_eq!(payment.details.is_valid, Validation::Invalid);
}

// ── Reconciler errors ──────────────────────────────────────────────

#[tokio::test]
async fn validate_distinguishes_not_found_from_fetch_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/payments/{PID}")))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;
    let payment = pending_payment(42, 10000);

    let err = validate_payment(&bridge(&server), &payment, PID).await.unwrap_err();
    assert!(matches!(err, PaymentError::NotFound { local_id: 42, .. }));

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/payments/{PID}")))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let err = validate_payment(&bridge(&server), &payment, PID).await.unwrap_err();
    match err {
        PaymentError::FetchFailed { reason, alma_id, .. } => {
            assert_eq!(alma_id, PID);
            assert!(reason.contains("500"), "{reason}");
        }
        other => panic!("expected FetchFailed, got {other:?}"),
    }
}

// ── Checkout ────────────────────────────────────────────────────────

#[tokio::test]
async fn checkout_creates_payment_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": PID,
            "state": "not_started",
            "purchase_amount": 10000,
            "url": "https://checkout.sandbox.getalma.eu/payment_11uPRjP4L9Dgbttx",
            "custom_data": {"payment_id": 42}
        })))
        .expect(1)
        .mount(&server)
        .await;
    let bridge = bridge(&server);
    let urls = CheckoutUrls::for_payment("https://shop.example", 42);
    let mut payment = LocalPayment::new(42, 10000, "EUR");

    let first = initiate_payment(&bridge, &BasePaymentData, &mut payment, &urls)
        .await
        .unwrap();
    assert_eq!(first.id, PID);
    assert_eq!(payment.state, LocalPaymentState::Processing);
    assert_eq!(payment.details.payment_id.as_deref(), Some(PID));

    let again = initiate_payment(&bridge, &BasePaymentData, &mut payment, &urls)
        .await
        .unwrap();
    assert_eq!(again, first);

    let sent: Value = server.received_requests().await.unwrap()[0].body_json().unwrap();
    assert_eq!(sent["payment"]["custom_data"]["payment_id"], json!(42));
    assert_eq!(sent["payment"]["ipn_callback_url"], json!("https://shop.example/payments/42/notify"));
}

// ── Eligibility ─────────────────────────────────────────────────────

#[tokio::test]
async fn eligibility_plan_for_configured_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/payments/eligibility"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"eligible": true, "installments_count": 3, "customer_total_cost_amount": 210,
             "annual_interest_rate": 1250, "payment_plan": [{"purchase_amount": 3404}]}
        ])))
        .mount(&server)
        .await;

    let view = installment_plan(&bridge(&server), &EligibilityQuery::new(10000), 3)
        .await
        .unwrap();
    assert_eq!(view.total_credit, 10210);

    assert!(installment_plan(&bridge(&server), &EligibilityQuery::new(10000), 4)
        .await
        .is_none());
}

#[tokio::test]
async fn eligibility_error_yields_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/payments/eligibility"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad cart"))
        .mount(&server)
        .await;

    let list = bridge(&server).eligibilities(json!({"payment": {"purchase_amount": 1}}), &[3]).await;
    assert!(list.is_empty());
}
