//! Admin API over real HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::Value;
use tokio::net::TcpListener;

use resilient_payments::admin::{setup_admin_router, AdminState};
use resilient_payments::payments::{PaymentError, PaymentRequest};
use resilient_payments::ResilientPaymentService;

mod common;
use common::{build_service, test_config, ScriptedProvider};

const KEY: &str = "test-admin-key";

async fn serve(service: Arc<ResilientPaymentService>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = setup_admin_router(AdminState::new(service, KEY));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_requests_without_valid_key_are_rejected() {
    let provider = Arc::new(ScriptedProvider::new());
    let addr = serve(Arc::new(build_service(&provider, &test_config()))).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("http://{addr}/admin/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("http://{addr}/admin/status"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_and_health() {
    let provider = Arc::new(ScriptedProvider::new());
    let service = Arc::new(build_service(&provider, &test_config()));
    service
        .create_payment_intent(PaymentRequest::new(5000, "usd", "consult fee"))
        .await;
    let addr = serve(service).await;
    let client = reqwest::Client::new();

    let status: Value = client
        .get(format!("http://{addr}/admin/status"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "operational");
    assert_eq!(status["circuit_state"], "CLOSED");

    let health: Value = client
        .get(format!("http://{addr}/admin/health"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["transaction_count"], 2);
    assert_eq!(health["retry_handler"]["total_operations"], 1);
    assert!(health["last_activity"].is_string());
}

#[tokio::test]
async fn test_transactions_filter_and_recover() {
    let provider = Arc::new(ScriptedProvider::new());
    let mut config = test_config();
    config.retries.max_attempts = 1;
    let service = Arc::new(build_service(&provider, &config));

    provider.push_failure(PaymentError::provider("api_connection_error", "connection reset"));
    let failed = service
        .create_payment_intent(PaymentRequest::new(5000, "usd", "consult fee"))
        .await;
    service
        .create_payment_intent(PaymentRequest::new(700, "eur", "other"))
        .await;
    let txn = failed.transaction_id.unwrap();

    let addr = serve(service).await;
    let client = reqwest::Client::new();

    let all: Vec<Value> = client
        .get(format!("http://{addr}/admin/transactions"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 4);

    let one: Vec<Value> = client
        .get(format!("http://{addr}/admin/transactions"))
        .query(&[("transaction_id", txn.as_str())])
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(one.len(), 2);
    assert_eq!(one[1]["action"], "payment_intent_create_failed");

    let summary: Value = client
        .post(format!("http://{addr}/admin/recover"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["recovered"], 1);
    assert_eq!(summary["failed"], 0);
}
