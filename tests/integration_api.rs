use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;

use eth_tx_observer::api::{build_router, AppState};
use eth_tx_observer::models::Transaction;
use eth_tx_observer::storage::{InMemoryStore, Storage};

const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

/// Store with ALICE subscribed and two committed blocks
fn setup_test_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::default());
    store.add_subscription(ALICE);

    let transactions = vec![
        Transaction {
            hash: "0x01".to_string(),
            block_number: 100,
            from: ALICE.to_string(),
            to: Some(BOB.to_string()),
            value: "0x10".to_string(),
        },
        Transaction {
            hash: "0x02".to_string(),
            block_number: 101,
            from: BOB.to_string(),
            to: Some(ALICE.to_string()),
            value: "0x20".to_string(),
        },
    ];

    store.commit_block(100, &transactions[..1]).unwrap();
    store.commit_block(101, &transactions[1..]).unwrap();
    store
}

fn create_test_app(store: Arc<InMemoryStore>) -> Router {
    build_router(AppState::new(store))
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_get_current_block() {
    let (status, json) = get_json(create_test_app(setup_test_store()), "/getCurrentBlock").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["current_block"], 101);
}

#[tokio::test]
async fn test_get_current_block_before_initialization() {
    let store = Arc::new(InMemoryStore::default());
    let (status, json) = get_json(create_test_app(store), "/getCurrentBlock").await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["current_block"].is_null());
}

#[tokio::test]
async fn test_get_transactions() {
    let (status, json) = get_json(
        create_test_app(setup_test_store()),
        &format!("/getTransactions?address={}", ALICE),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["address"], ALICE);
    assert_eq!(json["total_count"], 2);

    let transactions = json["transactions"].as_array().unwrap();
    assert_eq!(transactions[0]["hash"], "0x01");
    assert_eq!(transactions[0]["blockNumber"], 100);
    assert_eq!(transactions[1]["hash"], "0x02");
    assert_eq!(transactions[1]["from"], BOB);
}

#[tokio::test]
async fn test_get_transactions_for_unsubscribed_address_is_empty() {
    let (status, json) = get_json(
        create_test_app(setup_test_store()),
        &format!("/getTransactions?address={}", BOB),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_count"], 0);
    assert!(json["transactions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_subscribe_normalizes_address() {
    let store = setup_test_store();
    let mixed_case = "0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB";

    let (status, json) = get_json(
        create_test_app(store.clone()),
        &format!("/subscribe?address={}", mixed_case),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["address"], BOB);
    assert_eq!(json["subscribed"], true);
    assert!(store.is_subscribed(BOB));
}

#[tokio::test]
async fn test_unsubscribe_hides_history() {
    let store = setup_test_store();

    let (status, json) = get_json(
        create_test_app(store.clone()),
        &format!("/unsubscribe?address={}", ALICE),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["subscribed"], false);
    assert!(!store.is_subscribed(ALICE));

    let (_, json) = get_json(
        create_test_app(store),
        &format!("/getTransactions?address={}", ALICE),
    )
    .await;
    assert_eq!(json["total_count"], 0);
}

#[tokio::test]
async fn test_invalid_address_parameter() {
    let app = create_test_app(setup_test_store());

    for uri in [
        "/subscribe",
        "/subscribe?address=",
        "/subscribe?address=0x1234",
        "/getTransactions?address=0xzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz",
        "/unsubscribe?address=not-an-address",
    ] {
        let (status, json) = get_json(app.clone(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(json["error"], "invalid_parameter", "{}", uri);
        assert!(json["message"].as_str().unwrap().len() > 0);
    }
}

#[tokio::test]
async fn test_get_status_without_poller() {
    let (status, json) = get_json(create_test_app(setup_test_store()), "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["watermark"], 101);
    assert_eq!(json["subscriptions"], 1);
    assert_eq!(json["indexed_transactions"], 2);
    assert!(json["poller_state"].is_null());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = create_test_app(setup_test_store());
    let request = Request::builder().uri("/transactions").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
