use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use ferry_core::{OperationKind, OperationStatus, QueueConfig, SyncQueue};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct Received {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Value,
}

#[derive(Default)]
struct Server {
    statuses: Mutex<VecDeque<u16>>,
    received: Mutex<Vec<Received>>,
    delay: Mutex<Duration>,
}

impl Server {
    fn respond_with(&self, statuses: &[u16]) {
        self.statuses.lock().unwrap().extend(statuses);
    }

    fn respond_after(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

async fn record(
    State(server): State<Arc<Server>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    server.received.lock().unwrap().push(Received {
        method,
        path: uri.path().to_string(),
        headers,
        body: serde_json::from_str(&body).unwrap_or(Value::Null),
    });
    let status = server.statuses.lock().unwrap().pop_front().unwrap_or(200);
    let delay = *server.delay.lock().unwrap();
    tokio::time::sleep(delay).await;
    (
        StatusCode::from_u16(status).unwrap(),
        json!({ "status": status }).to_string(),
    )
}

async fn serve() -> (Arc<Server>, SocketAddr) {
    let server = Arc::new(Server::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new()
        .fallback(record)
        .with_state(Arc::clone(&server));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (server, addr)
}

fn open_queue(dir: &TempDir, base_url: String) -> SyncQueue {
    let config = QueueConfig {
        api_base_url: base_url,
        auth_token: Some("session-token".to_string()),
        dispatch_timeout_secs: 5,
        ..QueueConfig::default()
    };
    SyncQueue::open(dir.path().join("queue.db"), config).unwrap()
}

fn header<'a>(request: &'a Received, name: &str) -> &'a str {
    request.headers.get(name).unwrap().to_str().unwrap()
}

#[tokio::test]
async fn delivers_with_headers_and_route() {
    let (server, addr) = serve().await;
    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir, format!("http://{addr}"));

    let id = queue
        .queue_lineup_change("league-4", json!({"WR": "player-88"}))
        .unwrap();
    queue.flush().await;

    let received = server.received();
    assert_eq!(received.len(), 1);
    let request = &received[0];
    assert_eq!(request.method, Method::PUT);
    assert_eq!(request.path, "/api/leagues/league-4/lineup");
    assert_eq!(header(request, "x-operation-id"), id.to_string());
    assert_eq!(header(request, "idempotency-key"), id.to_string());
    assert_eq!(header(request, "x-sync-request"), "true");
    assert_eq!(header(request, "authorization"), "Bearer session-token");
    assert_eq!(header(request, "content-type"), "application/json");
    assert_eq!(request.body["leagueId"], "league-4");
    assert_eq!(request.body["changes"], json!({"WR": "player-88"}));

    assert_eq!(
        queue.get(&id).unwrap().unwrap().status,
        OperationStatus::Completed
    );
}

#[tokio::test]
async fn client_error_is_permanent() {
    let (server, addr) = serve().await;
    server.respond_with(&[422]);
    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir, format!("http://{addr}"));

    let id = queue
        .queue_waiver_claim("league-4", "player-2", None)
        .unwrap();
    queue.flush().await;

    let stored = queue.get(&id).unwrap().unwrap();
    assert_eq!(stored.status, OperationStatus::PermanentlyFailed);
    assert_eq!(stored.attempts, 1);
    let reason = stored.last_error.unwrap();
    assert!(reason.starts_with("HTTP 422"), "{reason}");
    assert!(reason.contains("\"status\":422"), "{reason}");
}

#[tokio::test]
async fn server_error_schedules_a_retry() {
    let (server, addr) = serve().await;
    server.respond_with(&[503]);
    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir, format!("http://{addr}"));

    let id = queue
        .enqueue(
            OperationKind::SettingsUpdate,
            json!({"theme": "dark"}),
            ferry_core::EnqueueOptions::new().deferred(),
        )
        .unwrap();
    queue.flush().await;

    let stored = queue.get(&id).unwrap().unwrap();
    assert_eq!(stored.status, OperationStatus::Pending);
    assert_eq!(stored.attempts, 1);
    assert_eq!(stored.next_eligible_at, stored.updated_at + 1_000);
    assert!(stored.last_error.unwrap().starts_with("HTTP 503"));

    // Still backing off
    queue.flush().await;
    assert_eq!(server.received().len(), 1);
    assert_eq!(server.received()[0].path, "/api/user/settings");
}

#[tokio::test]
async fn refused_connection_keeps_unsafe_operation_pending() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir, format!("http://{addr}"));

    // Nothing reached the server, so even a non-retry-safe kind stays queued
    let id = queue
        .queue_trade_proposal("league-4", json!({"give": ["p1"], "get": ["p2"]}))
        .unwrap();
    queue.flush().await;

    let stored = queue.get(&id).unwrap().unwrap();
    assert_eq!(stored.status, OperationStatus::Pending);
    assert_eq!(stored.attempts, 1);
    assert!(stored.last_error.unwrap().contains("connection failed"));
}

#[tokio::test]
async fn raised_timeout_applies_to_running_queue() {
    let (server, addr) = serve().await;
    server.respond_after(Duration::from_millis(1_500));
    let dir = tempfile::tempdir().unwrap();
    let queue = SyncQueue::open(
        dir.path().join("queue.db"),
        QueueConfig {
            api_base_url: format!("http://{addr}"),
            dispatch_timeout_secs: 1,
            ..QueueConfig::default()
        },
    )
    .unwrap();

    queue
        .update_config(QueueConfig {
            dispatch_timeout_secs: 5,
            ..queue.config()
        })
        .unwrap();

    let id = queue
        .enqueue(
            OperationKind::SettingsUpdate,
            json!({"theme": "light"}),
            ferry_core::EnqueueOptions::new().deferred(),
        )
        .unwrap();
    queue.flush().await;

    let stored = queue.get(&id).unwrap().unwrap();
    assert_eq!(stored.status, OperationStatus::Completed);
    assert_eq!(stored.attempts, 1);
    assert_eq!(server.received().len(), 1);
}
