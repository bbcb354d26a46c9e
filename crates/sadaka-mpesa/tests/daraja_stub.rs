//! Daraja Client Tests
//!
//! Runs the client against a local axum server that imitates the Daraja
//! token, STK push and STK query endpoints.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use sadaka_core::{
    submit_with_retry, PaymentGateway, RetryPolicy, TransactionLedger,
};
use sadaka_core::memory::InMemoryTransactionStore;
use sadaka_mpesa::{CallbackEnvelope, MpesaConfig, MpesaGateway};
use sadaka_types::{
    AccountDetails, Amount, CorrelationRef, PayerId, PaymentMethod, PaymentRequest, PhoneNumber,
    SadakaError, StatusOutcome, TransactionStatus,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Stub server
// =============================================================================

#[derive(Default)]
struct Stub {
    token_calls: AtomicUsize,
    push_calls: AtomicUsize,
    query_calls: AtomicUsize,
    push_script: Mutex<VecDeque<(StatusCode, Value)>>,
    query_script: Mutex<VecDeque<(StatusCode, Value)>>,
    push_bodies: Mutex<Vec<Value>>,
}

impl Stub {
    fn script_push(&self, status: StatusCode, body: Value) {
        self.push_script.lock().unwrap().push_back((status, body));
    }

    fn script_query(&self, status: StatusCode, body: Value) {
        self.query_script.lock().unwrap().push_back((status, body));
    }

    fn pushes(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    fn tokens(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }
}

fn accepted(checkout: &str) -> (StatusCode, Value) {
    (
        StatusCode::OK,
        json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": checkout,
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        }),
    )
}

async fn token(State(stub): State<Arc<Stub>>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    stub.token_calls.fetch_add(1, Ordering::SeqCst);
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    (
        StatusCode::OK,
        Json(json!({"access_token": "stub-token", "expires_in": "3599"})),
    )
}

async fn push(
    State(stub): State<Arc<Stub>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    stub.push_calls.fetch_add(1, Ordering::SeqCst);
    stub.push_bodies.lock().unwrap().push(body);
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer stub-token") {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    let (status, body) = stub
        .push_script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| accepted("ws_CO_DEFAULT"));
    (status, Json(body))
}

async fn query(State(stub): State<Arc<Stub>>) -> (StatusCode, Json<Value>) {
    stub.query_calls.fetch_add(1, Ordering::SeqCst);
    let (status, body) = stub
        .query_script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((StatusCode::OK, json!({"ResponseCode": "0"})));
    (status, Json(body))
}

async fn start_stub() -> (Arc<Stub>, MpesaGateway) {
    let stub = Arc::new(Stub::default());
    let app = Router::new()
        .route("/oauth/v1/generate", get(token))
        .route("/mpesa/stkpush/v1/processrequest", post(push))
        .route("/mpesa/stkpushquery/v1/query", post(query))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = MpesaConfig {
        base_url: Some(format!("http://{addr}")),
        consumer_key: "consumer".to_string(),
        consumer_secret: "secret".to_string(),
        passkey: "passkey".to_string(),
        callback_url: "https://example.org/api/v1/mpesa/callback".to_string(),
        request_timeout: Duration::from_secs(5),
        ..MpesaConfig::default()
    };
    (stub, MpesaGateway::new(config).unwrap())
}

fn offering_request() -> PaymentRequest {
    PaymentRequest {
        payer_id: PayerId::from("member-1"),
        destination: "Offering".to_string(),
        method: PaymentMethod::Paybill,
        amount: Amount::from_shillings(200),
        description: "Sunday offering".to_string(),
        sender: Some(PhoneNumber::normalize("0712345678").unwrap()),
        recipient: AccountDetails::Paybill {
            business_code: "247247".to_string(),
            account_number: "OFFERING".to_string(),
        },
        client_reference: None,
    }
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        backoff: Duration::from_millis(5),
    }
}

// =============================================================================
// Submission
// =============================================================================

#[tokio::test]
async fn test_push_reuses_access_token() {
    let (stub, gateway) = start_stub().await;
    stub.script_push(StatusCode::OK, accepted("ws_CO_1").1);
    stub.script_push(StatusCode::OK, accepted("ws_CO_2").1);

    let first = gateway.submit(&offering_request()).await.unwrap();
    let second = gateway.submit(&offering_request()).await.unwrap();

    assert_eq!(first.correlation_ref, CorrelationRef::new("ws_CO_1"));
    assert_eq!(second.correlation_ref, CorrelationRef::new("ws_CO_2"));
    assert_eq!(stub.tokens(), 1);
    assert_eq!(stub.pushes(), 2);

    let body = stub.push_bodies.lock().unwrap()[0].clone();
    assert_eq!(body["BusinessShortCode"], "174379");
    assert_eq!(body["TransactionType"], "CustomerPayBillOnline");
    assert_eq!(body["PhoneNumber"], "254712345678");
    assert_eq!(body["PartyB"], "247247");
    assert_eq!(body["AccountReference"], "OFFERING");
    assert_eq!(body["Amount"], 200);
}

#[tokio::test]
async fn test_provider_rejection_is_not_retried() {
    let (stub, gateway) = start_stub().await;
    stub.script_push(
        StatusCode::BAD_REQUEST,
        json!({
            "requestId": "1234-5678",
            "errorCode": "400.002.02",
            "errorMessage": "Bad Request - Invalid PhoneNumber"
        }),
    );

    let err = submit_with_retry(&gateway, &offering_request(), &quick_retry())
        .await
        .unwrap_err();

    assert!(matches!(err, SadakaError::GatewayRejected { ref code, .. } if code == "400.002.02"));
    assert_eq!(stub.pushes(), 1);
}

#[tokio::test]
async fn test_outage_is_retried_once() {
    let (stub, gateway) = start_stub().await;
    stub.script_push(StatusCode::SERVICE_UNAVAILABLE, json!({"errorMessage": "down"}));
    stub.script_push(StatusCode::OK, accepted("ws_CO_AFTER_RETRY").1);

    let submission = submit_with_retry(&gateway, &offering_request(), &quick_retry())
        .await
        .unwrap();

    assert_eq!(submission.correlation_ref.as_str(), "ws_CO_AFTER_RETRY");
    assert_eq!(stub.pushes(), 2);
}

#[tokio::test]
async fn test_persistent_outage_gives_up_after_one_retry() {
    let (stub, gateway) = start_stub().await;
    stub.script_push(StatusCode::BAD_GATEWAY, json!({}));
    stub.script_push(StatusCode::BAD_GATEWAY, json!({}));
    stub.script_push(StatusCode::OK, accepted("ws_CO_NEVER").1);

    let err = submit_with_retry(&gateway, &offering_request(), &quick_retry())
        .await
        .unwrap_err();

    assert!(matches!(err, SadakaError::GatewayUnavailable { .. }));
    assert_eq!(stub.pushes(), 2);
}

#[tokio::test]
async fn test_refused_token_is_refetched() {
    let (stub, gateway) = start_stub().await;
    stub.script_push(StatusCode::UNAUTHORIZED, json!({}));

    let err = gateway.submit(&offering_request()).await.unwrap_err();
    assert!(matches!(err, SadakaError::GatewayUnavailable { .. }));

    gateway.submit(&offering_request()).await.unwrap();
    assert_eq!(stub.tokens(), 2);
}

#[tokio::test]
async fn test_bank_transfer_never_reaches_daraja() {
    let (stub, gateway) = start_stub().await;
    let mut request = offering_request();
    request.method = PaymentMethod::BankAccount;
    request.sender = None;

    let err = gateway.submit(&request).await.unwrap_err();
    assert!(matches!(err, SadakaError::GatewayRejected { ref code, .. } if code == "UNSUPPORTED_METHOD"));
    assert_eq!(stub.pushes(), 0);
}

// =============================================================================
// Status query
// =============================================================================

#[tokio::test]
async fn test_query_pending_then_completed() {
    let (stub, gateway) = start_stub().await;
    stub.script_query(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({
            "requestId": "1234",
            "errorCode": "500.001.1001",
            "errorMessage": "The transaction is being processed"
        }),
    );
    stub.script_query(
        StatusCode::OK,
        json!({
            "ResponseCode": "0",
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_1",
            "ResultCode": "0",
            "ResultDesc": "The service request is processed successfully."
        }),
    );

    let reference = CorrelationRef::new("ws_CO_1");
    assert_eq!(gateway.query_status(&reference).await.unwrap(), None);

    let outcome = gateway.query_status(&reference).await.unwrap();
    assert!(matches!(
        outcome,
        Some(StatusOutcome::Completed { receipt_number: None, .. })
    ));
    assert_eq!(stub.query_calls.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Callback into the ledger
// =============================================================================

#[tokio::test]
async fn test_callback_settles_recorded_transaction() {
    let (stub, gateway) = start_stub().await;
    stub.script_push(StatusCode::OK, accepted("ws_CO_191220191020363925").1);

    let ledger = TransactionLedger::new(Arc::new(InMemoryTransactionStore::new()));
    let request = offering_request();
    let submission = gateway.submit(&request).await.unwrap();
    let pending = ledger.record_submission(&request, &submission).await.unwrap();
    assert_eq!(pending.status, TransactionStatus::Pending);

    let callback = json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        {"Name": "Amount", "Value": 200},
                        {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                        {"Name": "PhoneNumber", "Value": 254712345678u64}
                    ]
                }
            }
        }
    });
    let update = CallbackEnvelope::parse(callback.to_string().as_bytes())
        .unwrap()
        .into_status_update()
        .unwrap();
    ledger.apply_status_update(&update).await.unwrap();

    let settled = ledger.get(&pending.id).await.unwrap();
    assert_eq!(settled.status, TransactionStatus::Completed);
    assert_eq!(settled.mpesa_receipt_number.as_deref(), Some("NLJ7RT61SV"));
}
