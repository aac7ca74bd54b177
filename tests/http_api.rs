use anyhow::anyhow;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceExt;

use guestbook::db::{EntryStore, SqliteStore};
use guestbook::http::{router, AppState};
use guestbook::model::NotificationEvent;
use guestbook::queue::QueueTransport;
use guestbook::relay::NotificationRelay;
use guestbook::service::IngestionService;

#[derive(Default)]
struct RecordingQueue {
    down: bool,
    published: Mutex<Vec<Bytes>>,
}

#[async_trait::async_trait]
impl QueueTransport for RecordingQueue {
    async fn publish(&self, _message_id: &str, payload: Bytes) -> anyhow::Result<()> {
        if self.down {
            return Err(anyhow!("no route to queue"));
        }
        self.published.lock().await.push(payload);
        Ok(())
    }
}

async fn setup_store() -> Arc<SqliteStore> {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    store.ensure_schema().await.unwrap();
    Arc::new(store)
}

fn app(store: Arc<SqliteStore>, queue: Arc<RecordingQueue>) -> Router {
    let service = IngestionService::new(store, NotificationRelay::new(queue));
    router(AppState::new(service))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post(path: &str, body: &Value) -> Request<Body> {
    Request::post(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::get(path).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn create_then_list_returns_new_entry_first() {
    let queue = Arc::new(RecordingQueue::default());
    let app = app(setup_store().await, queue.clone());

    let (status, first) = send(&app, post("/entries", &json!({"name": "Zed", "message": "Old"}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, created) = send(&app, post("/entries", &json!({"name": "Ann", "message": "Hi"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(created["id"].is_i64());
    assert_eq!(created["name"], "Ann");
    assert_eq!(created["message"], "Hi");
    assert!(created["created_at"].is_string());

    let (status, listed) = send(&app, get("/entries")).await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0], created);
    assert_eq!(listed[1], first);

    assert_eq!(queue.published.lock().await.len(), 2);
}

#[tokio::test]
async fn list_twice_is_identical() {
    let app = app(setup_store().await, Arc::new(RecordingQueue::default()));
    for i in 0..3 {
        let body = json!({"name": format!("n{i}"), "message": "m"});
        assert_eq!(send(&app, post("/entries", &body)).await.0, StatusCode::OK);
    }
    let (_, a) = send(&app, get("/entries")).await;
    let (_, b) = send(&app, get("/entries")).await;
    assert_eq!(a, b);
}

#[tokio::test]
async fn empty_name_is_rejected() {
    let store = setup_store().await;
    let app = app(store.clone(), Arc::new(RecordingQueue::default()));

    let (status, body) = send(&app, post("/entries", &json!({"name": "", "message": "Hi"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Name and message are required"}));
    assert!(store.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn long_name_is_rejected_without_insert() {
    let store = setup_store().await;
    let app = app(store.clone(), Arc::new(RecordingQueue::default()));

    let body = json!({"name": "n".repeat(150), "message": "Hi"});
    let (status, body) = send(&app, post("/entries", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Name must be 100 characters or less");
    assert!(store.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn non_string_fields_are_rejected() {
    let app = app(setup_store().await, Arc::new(RecordingQueue::default()));
    let (status, body) = send(&app, post("/entries", &json!({"name": 12, "message": "Hi"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Name and message must be strings");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = app(setup_store().await, Arc::new(RecordingQueue::default()));
    let request = Request::post("/entries")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn stored_values_are_sanitized() {
    let store = setup_store().await;
    let app = app(store.clone(), Arc::new(RecordingQueue::default()));

    let (status, created) =
        send(&app, post("/entries", &json!({"name": "  Ann  ", "message": "\n Hi \t"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["name"], "Ann");
    assert_eq!(created["message"], "Hi");

    let stored = store.list_all().await.unwrap();
    assert_eq!(stored[0].name, "Ann");
    assert_eq!(stored[0].message, "Hi");
}

#[tokio::test]
async fn queue_outage_does_not_affect_create() {
    let store = setup_store().await;
    let queue = Arc::new(RecordingQueue {
        down: true,
        ..Default::default()
    });
    let app = app(store.clone(), queue);

    let (status, created) = send(&app, post("/entries", &json!({"name": "Ann", "message": "Hi"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["name"], "Ann");
    assert_eq!(store.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn storage_failure_is_internal_error() {
    // No schema: every query fails.
    let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
    let queue = Arc::new(RecordingQueue::default());
    let app = app(store, queue.clone());

    let (status, body) = send(&app, get("/entries")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());

    let (status, body) = send(&app, post("/entries", &json!({"name": "Ann", "message": "Hi"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
    assert!(queue.published.lock().await.is_empty());
}

#[tokio::test]
async fn published_event_matches_created_entry() {
    let queue = Arc::new(RecordingQueue::default());
    let app = app(setup_store().await, queue.clone());

    let (_, created) = send(&app, post("/api/guestbook", &json!({"name": "Ann", "message": "Hi"}))).await;
    let published = queue.published.lock().await;
    let event = NotificationEvent::from_payload(&published[0]).unwrap();
    assert_eq!(event.entry_id, created["id"].as_i64().unwrap());
    assert_eq!(event.name, "Ann");
    assert_eq!(event.message, "Hi");
}

#[tokio::test]
async fn legacy_path_lists_entries() {
    let app = app(setup_store().await, Arc::new(RecordingQueue::default()));
    send(&app, post("/entries", &json!({"name": "Ann", "message": "Hi"}))).await;
    let (status, listed) = send(&app, get("/api/guestbook")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn health_reports_healthy() {
    let app = app(setup_store().await, Arc::new(RecordingQueue::default()));
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}
