//! Status API exercised over a loopback socket.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::Arc;

use burrow_status::server;
use burrow_status::store::StatusStore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start() -> (SocketAddr, Arc<StatusStore>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let store = Arc::new(StatusStore::default());
    drop(tokio::spawn(server::serve(listener, Arc::clone(&store))));
    (addr, store)
}

/// Sends `raw` and returns (status code, body).
async fn exchange(addr: SocketAddr, raw: &str) -> (u16, serde_json::Value) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut response = String::new();
    let _ = stream.read_to_string(&mut response).await.unwrap();

    let (head, body) = response.split_once("\r\n\r\n").unwrap();
    let code = head.split_whitespace().nth(1).unwrap().parse().unwrap();
    (code, serde_json::from_str(body).unwrap())
}

fn post(body: &str) -> String {
    format!(
        "POST /api/v1/status HTTP/1.1\r\nHost: test\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
}

const GET: &str = "GET /api/v1/status HTTP/1.1\r\nHost: test\r\n\r\n";

#[tokio::test]
async fn get_reports_initial_status() {
    let (addr, _) = start().await;
    let (code, body) = exchange(addr, GET).await;
    assert_eq!(code, 200);
    assert_eq!(body, serde_json::json!({"status": "OK"}));
}

#[tokio::test]
async fn post_then_get_round_trip() {
    let (addr, store) = start().await;

    let (code, body) = exchange(addr, &post(r#"{"status":"rebooting"}"#)).await;
    assert_eq!(code, 201);
    assert_eq!(body, serde_json::json!({"status": "rebooting"}));
    assert_eq!(store.get(), "rebooting");

    let (code, body) = exchange(addr, GET).await;
    assert_eq!(code, 200);
    assert_eq!(body["status"], "rebooting");
}

#[tokio::test]
async fn post_errors_leave_status_unchanged() {
    let (addr, store) = start().await;

    let (code, body) = exchange(addr, &post("{oops")).await;
    assert_eq!(code, 400);
    assert_eq!(body["error"], "Invalid JSON");

    let (code, body) = exchange(addr, &post(r#"{"state":"x"}"#)).await;
    assert_eq!(code, 400);
    assert_eq!(body["error"], "Missing 'status' key");

    assert_eq!(store.get(), "OK");
}

#[tokio::test]
async fn unknown_routes_and_methods() {
    let (addr, _) = start().await;
    let (code, _) = exchange(addr, "GET /nope HTTP/1.1\r\n\r\n").await;
    assert_eq!(code, 404);
    let (code, _) = exchange(addr, "PUT /api/v1/status HTTP/1.1\r\nContent-Length: 0\r\n\r\n").await;
    assert_eq!(code, 405);
}

#[tokio::test]
async fn oversized_body_is_refused() {
    let (addr, _) = start().await;
    let raw = "POST /api/v1/status HTTP/1.1\r\nContent-Length: 1000000\r\n\r\n";
    let (code, body) = exchange(addr, raw).await;
    assert_eq!(code, 413);
    assert_eq!(body["error"], "Payload too large");
}
