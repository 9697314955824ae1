//! Admin router behaviour through `tower::ServiceExt::oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use busan_donations::admin::{setup_admin_router, AdminState};
use busan_donations::chain::Network;
use busan_donations::currency::{Currency, PaymentMethod};
use busan_donations::payments::{LedgerStatus, LedgerStore, NewLedgerRecord};

mod common;
use common::*;

const KEY: &str = "test-admin-key";

async fn router() -> Router {
    let store = memory_store();
    for (reference, network, method, status) in [
        (TX_HASH, Network::Ethereum, PaymentMethod::CryptoProcessor, LedgerStatus::Confirmed),
        ("pi_pending", Network::Card, PaymentMethod::Card, LedgerStatus::Pending),
    ] {
        store
            .upsert(NewLedgerRecord {
                payer: PAYER.to_string(),
                amount: dec!(1),
                currency: Currency::from(if method == PaymentMethod::Card { "USD" } else { "ETH" }),
                external_reference: reference.to_string(),
                status,
                method,
                network,
            })
            .await
            .unwrap();
    }

    let adapter = ScriptedAdapter::new(Network::Ethereum, vec![]);
    let service = Arc::new(service_with(adapter, store, 3));
    setup_admin_router(AdminState::new(service, KEY), Duration::from_secs(5))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {}", KEY))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let app = router().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/admin/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/status")
                .header("authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_reports_networks_and_request_id() {
    let response = router().await.oneshot(get("/admin/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = json_body(response).await;
    assert_eq!(body["status"], "operational");
    assert_eq!(body["networks"], serde_json::json!(["ethereum"]));
    assert_eq!(body["ledger_backend"], "memory");
}

#[tokio::test]
async fn test_ledger_listing_and_lookup() {
    let app = router().await;

    let body = json_body(app.clone().oneshot(get("/admin/ledger")).await.unwrap()).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let body = json_body(app.clone().oneshot(get("/admin/ledger?status=pending")).await.unwrap()).await;
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["external_reference"], "pi_pending");

    let response = app.clone().oneshot(get(&format!("/admin/ledger/{}", TX_HASH))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "confirmed");

    let response = app.oneshot(get("/admin/ledger/0xunknown")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_refund_flow() {
    let app = router().await;

    let body = json_body(app.clone().oneshot(get("/admin/ledger/pi_pending/refund-eligibility")).await.unwrap()).await;
    assert_eq!(body["can_refund"], false);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/admin/ledger/{}/refund", TX_HASH))
        .header("authorization", format!("Bearer {}", KEY))
        .header("content-type", "application/json")
        .body(Body::from(r#"{"reason":"duplicate donation"}"#))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["mode"], "manual-request");

    let body = json_body(app.oneshot(get("/admin/refund-requests")).await.unwrap()).await;
    let requests = body.as_array().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["reason"], "duplicate donation");
}

#[tokio::test]
async fn test_explorer_links() {
    let app = router().await;

    let body = json_body(app.clone().oneshot(get("/admin/explorer?network=polygon&reference=0xabc")).await.unwrap()).await;
    assert_eq!(body["url"], "https://polygonscan.com/tx/0xabc");

    let body = json_body(app.clone().oneshot(get("/admin/explorer?network=dogechain&reference=0xabc")).await.unwrap()).await;
    assert_eq!(body["url"], "https://etherscan.io/tx/0xabc");

    let body = json_body(app.oneshot(get("/admin/explorer?network=card&reference=pi_1")).await.unwrap()).await;
    assert!(body["url"].is_null());
}
