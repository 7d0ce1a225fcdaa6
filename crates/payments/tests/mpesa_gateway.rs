//! Tests for the Daraja client against a local mock gateway.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use payments::{
    GatewayConfig, GatewayError, MpesaGateway, PaymentGateway, PhoneNumber, PushRequest, password,
};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct MockState {
    pushes: Arc<Mutex<Vec<Value>>>,
    push_status: Arc<Mutex<Option<StatusCode>>>,
    omit_checkout_id: Arc<Mutex<bool>>,
}

async fn token(headers: HeaderMap) -> impl IntoResponse {
    // base64("key:secret")
    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some("Basic a2V5OnNlY3JldA==") => (
            StatusCode::OK,
            Json(json!({"access_token": "test-token", "expires_in": "3599"})),
        ),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"errorCode": "400.008.01", "errorMessage": "Invalid Authentication"})),
        ),
    }
}

async fn push(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) != Some("Bearer test-token") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"errorMessage": "Invalid Access Token"})),
        );
    }
    if let Some(status) = *state.push_status.lock().unwrap() {
        return (
            status,
            Json(json!({"errorMessage": "Bad Request - Invalid PhoneNumber"})),
        );
    }
    state.pushes.lock().unwrap().push(body);

    if *state.omit_checkout_id.lock().unwrap() {
        return (StatusCode::OK, Json(json!({"ResponseCode": "0"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        })),
    )
}

async fn start_mock() -> (String, MockState) {
    let state = MockState::default();
    let app = Router::new()
        .route("/oauth/v1/generate", get(token))
        .route("/mpesa/stkpush/v1/processrequest", post(push))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

fn config(base_url: String) -> GatewayConfig {
    GatewayConfig {
        base_url,
        passkey: "passkey".to_string(),
        client_key: "key".to_string(),
        client_secret: "secret".to_string(),
        callback_url: "https://library.example/transaction_call_back".to_string(),
        timeout: Duration::from_secs(5),
        ..GatewayConfig::default()
    }
}

fn push_request() -> PushRequest {
    PushRequest {
        amount: 200,
        phone: PhoneNumber::parse("254708374149").unwrap(),
        account_reference: "Library".to_string(),
        narrative: "Payment for receipt 1".to_string(),
    }
}

#[tokio::test]
async fn test_authenticate_and_push() {
    let (base_url, state) = start_mock().await;
    let gateway = MpesaGateway::new(config(base_url)).unwrap();

    let token = gateway.authenticate().await.unwrap();
    assert_eq!(token.as_str(), "test-token");

    let response = gateway.request_push(&token, &push_request()).await.unwrap();
    assert_eq!(response.checkout_request_id, "ws_CO_191220191020363925");

    let pushes = state.pushes.lock().unwrap();
    assert_eq!(pushes.len(), 1);
    let body = &pushes[0];
    assert_eq!(body["BusinessShortCode"], "174379");
    assert_eq!(body["TransactionType"], "CustomerPayBillOnline");
    assert_eq!(body["Amount"], 200);
    assert_eq!(body["PartyA"], "254708374149");
    assert_eq!(body["PartyB"], "174379");
    assert_eq!(body["PhoneNumber"], "254708374149");
    assert_eq!(
        body["CallBackURL"],
        "https://library.example/transaction_call_back"
    );
    assert_eq!(body["AccountReference"], "Library");

    let timestamp = body["Timestamp"].as_str().unwrap();
    assert_eq!(timestamp.len(), 14);
    assert_eq!(body["Password"], password("174379", "passkey", timestamp));
}

#[tokio::test]
async fn test_wrong_credentials_is_auth_failure() {
    let (base_url, _) = start_mock().await;
    let mut config = config(base_url);
    config.client_secret = "wrong".to_string();
    let gateway = MpesaGateway::new(config).unwrap();

    let err = gateway.authenticate().await.unwrap_err();
    assert!(matches!(err, GatewayError::AuthFailure(_)));
}

#[tokio::test]
async fn test_rejected_push_is_protocol_error() {
    let (base_url, state) = start_mock().await;
    *state.push_status.lock().unwrap() = Some(StatusCode::BAD_REQUEST);
    let gateway = MpesaGateway::new(config(base_url)).unwrap();

    let token = gateway.authenticate().await.unwrap();
    let err = gateway
        .request_push(&token, &push_request())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Protocol(_)));
}

#[tokio::test]
async fn test_missing_checkout_reference_is_protocol_error() {
    let (base_url, state) = start_mock().await;
    *state.omit_checkout_id.lock().unwrap() = true;
    let gateway = MpesaGateway::new(config(base_url)).unwrap();

    let token = gateway.authenticate().await.unwrap();
    let err = gateway
        .request_push(&token, &push_request())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Protocol(_)));
}

#[tokio::test]
async fn test_unreachable_gateway_is_transport_error() {
    // Nothing listens on the discard port.
    let gateway = MpesaGateway::new(config("http://127.0.0.1:9".to_string())).unwrap();
    let err = gateway.authenticate().await.unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)));
}
