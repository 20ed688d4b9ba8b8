//! API integration tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use vmix_api::{create_router, ApiConfig, AppState};
use vmix_queue::{MemoryBackend, QueueClass, QueueJob};

fn create_test_router(backend: Arc<MemoryBackend>) -> Router {
    let state = AppState::with_backend(ApiConfig::default(), backend);
    create_router(state, None)
}

fn valid_request() -> Value {
    json!({
        "task_name": "launch",
        "video_blocks": {
            "block_1": ["https://cdn.example.com/a.mp4", "https://cdn.example.com/b.mp4"],
            "block_2": ["https://cdn.example.com/c.mp4"]
        },
        "audio_blocks": {"music": ["https://cdn.example.com/x.mp3"]},
        "text_to_speech": [{"text": "Hello there", "voice": "Rachel"}]
    })
}

async fn post_json(app: Router, body: String) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/process_media")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

/// Test health endpoint.
#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_router(Arc::new(MemoryBackend::new()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_ready_without_redis_is_skipped() {
    let app = create_test_router(Arc::new(MemoryBackend::new()));

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["redis"]["status"], "skipped");
}

#[tokio::test]
async fn test_process_media_enqueues_orchestration() {
    let backend = Arc::new(MemoryBackend::new());
    let app = create_test_router(backend.clone());

    let (status, body) = post_json(app, valid_request().to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");

    let queued = backend.pending(QueueClass::Default);
    assert_eq!(queued.len(), 1);
    match &queued[0] {
        QueueJob::Orchestrate(job) => {
            assert_eq!(body["task_id"], job.task_id.as_str());
            assert_eq!(job.request.task_name, "launch");
        }
        other => panic!("unexpected job {other:?}"),
    }
}

#[tokio::test]
async fn test_too_many_combinations_rejected() {
    let backend = Arc::new(MemoryBackend::new());
    let app = create_test_router(backend.clone());

    let clips = |n: usize| -> Vec<String> {
        (0..n).map(|i| format!("https://cdn.example.com/{i}.mp4")).collect()
    };
    let mut request = valid_request();
    request["video_blocks"] = json!({
        "block_1": clips(50),
        "block_2": clips(10),
        "block_3": clips(10),
    });

    let (status, body) = post_json(app, request.to_string()).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "combination_limit_exceeded");
    assert!(backend.pending(QueueClass::Default).is_empty());
}

#[tokio::test]
async fn test_invalid_url_rejected() {
    let backend = Arc::new(MemoryBackend::new());
    let app = create_test_router(backend.clone());

    let mut request = valid_request();
    request["audio_blocks"] = json!({"music": ["ftp://cdn.example.com/x.mp3"]});

    let (status, body) = post_json(app, request.to_string()).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "invalid_url");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = create_test_router(Arc::new(MemoryBackend::new()));

    let (status, body) = post_json(app, "{\"task_name\": ".to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_backend_failure_is_internal_error() {
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_enqueues_after(0);
    let app = create_test_router(backend);

    let (status, _) = post_json(app, valid_request().to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
