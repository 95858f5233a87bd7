//! Ledger HTTP contract tests
//!
//! Runs the router against the memory store:
//! - recording a debit updates the pocket and echoes the transaction
//! - unknown pocket / bad type / missing user map to 400 / 400 / 404
//! - the listing routes reflect what was recorded
//! - a real socket round trip through the accept loop

use bson::oid::ObjectId;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{Method, StatusCode};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use pocket_ledger::server::{route, serve, AppState};
use pocket_ledger::store::{MemoryUserStore, SEED_BALANCE};

fn state() -> AppState {
    let id = ObjectId::new();
    AppState::new(id, "*", Arc::new(MemoryUserStore::seeded(id, "Asha"))).unwrap()
}

async fn call(
    state: &AppState,
    method: Method,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let body = if body.is_null() {
        Bytes::new()
    } else {
        Bytes::from(body.to_string())
    };
    let response = route(state, method, path, body).await;
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn transaction(pocket: &str, kind: &str, amount: f64) -> serde_json::Value {
    serde_json::json!({
        "pocket": pocket,
        "type": kind,
        "amount": amount,
        "upiId": "9131646124@bank",
        "payee": "Vaibhav",
        "message": "test transaction"
    })
}

// =============================================================================
// POST /api/user/transaction
// =============================================================================

#[tokio::test]
async fn test_debit_is_recorded() {
    let state = state();
    let (status, body) = call(
        &state,
        Method::POST,
        "/api/user/transaction",
        transaction("Fitness", "debit", 10.0),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Transaction added");
    assert_eq!(body["user"]["name"], "Asha");
    assert_eq!(body["user"]["pocket"]["name"], "Fitness");
    assert_eq!(body["user"]["pocket"]["balance"], SEED_BALANCE - 10.0);
    assert_eq!(body["user"]["pocket"]["spent"], 10.0);
    assert_eq!(body["user"]["transaction"]["upiId"], "9131646124@bank");
    assert_eq!(body["user"]["transaction"]["type"], "debit");
}

#[tokio::test]
async fn test_rejections() {
    let state = state();

    let (status, body) = call(
        &state,
        Method::POST,
        "/api/user/transaction",
        transaction("Rent", "debit", 10.0),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Pocket not found");

    let (status, body) = call(
        &state,
        Method::POST,
        "/api/user/transaction",
        transaction("Food", "refund", 10.0),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid transaction type");

    let (status, _) = call(
        &state,
        Method::POST,
        "/api/user/transaction",
        serde_json::json!({ "pocket": "Food" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = call(&state, Method::GET, "/api/user/transactions", serde_json::Value::Null).await;
    assert_eq!(body["transactions"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_missing_user_is_404() {
    let state = AppState::new(ObjectId::new(), "*", Arc::new(MemoryUserStore::new())).unwrap();

    let (status, body) = call(
        &state,
        Method::POST,
        "/api/user/transaction",
        transaction("Food", "debit", 1.0),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");

    let (status, _) = call(&state, Method::GET, "/api/user/pockets", serde_json::Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Listing routes
// =============================================================================

#[tokio::test]
async fn test_listings_reflect_recorded_transactions() {
    let state = state();
    call(&state, Method::POST, "/api/user/transaction", transaction("Food", "debit", 100.0)).await;
    call(&state, Method::POST, "/api/user/transaction", transaction("Food", "credit", 40.0)).await;

    let (status, body) = call(&state, Method::GET, "/api/user/transactions", serde_json::Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[1]["type"], "credit");

    let (status, body) = call(&state, Method::GET, "/api/user/pockets", serde_json::Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Asha");
    let food = body["pockets"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["name"] == "Food")
        .unwrap();
    assert_eq!(food["balance"], SEED_BALANCE - 60.0);
    assert_eq!(food["spent"], 100.0);
}

#[tokio::test]
async fn test_api_root() {
    let (status, body) = call(&state(), Method::GET, "/api", serde_json::Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "API is working!");
}

// =============================================================================
// Socket round trip
// =============================================================================

#[tokio::test]
async fn test_socket_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve(listener, Arc::new(state())));

    let body = transaction("Travel", "debit", 250.0).to_string();
    let request = format!(
        "POST /api/user/transaction HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        addr,
        body.len(),
        body
    );

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    assert!(raw.starts_with("HTTP/1.1 200 OK"));
    assert!(raw.contains("\"Transaction added\""));
    server.abort();
}
