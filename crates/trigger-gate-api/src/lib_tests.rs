//! Tests for interceptor dispatch in the HTTP layer.

use super::*;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use std::sync::Mutex;
use tower::ServiceExt;
use trigger_gate_core::{Interceptor, InterceptorResponse, StatusCode as InterceptorStatus};

// ============================================================================
// Test interceptors
// ============================================================================

/// Records the requests it receives and answers with a preset response.
struct RecordingInterceptor {
    response: InterceptorResponse,
    received: Mutex<Vec<InterceptorRequest>>,
}

impl RecordingInterceptor {
    fn new(response: InterceptorResponse) -> Arc<Self> {
        Arc::new(Self {
            response,
            received: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl Interceptor for RecordingInterceptor {
    async fn process(&self, request: &InterceptorRequest) -> InterceptorResponse {
        self.received.lock().unwrap().push(request.clone());
        self.response.clone()
    }
}

/// Never answers within any reasonable deadline.
struct StalledInterceptor;

#[async_trait]
impl Interceptor for StalledInterceptor {
    async fn process(&self, _request: &InterceptorRequest) -> InterceptorResponse {
        tokio::time::sleep(Duration::from_secs(60)).await;
        InterceptorResponse::allow()
    }
}

fn app_with(name: &str, interceptor: Arc<dyn Interceptor>, timeout: Duration) -> Router {
    let mut registry = InterceptorRegistry::new();
    registry.register(InterceptorName::new(name).unwrap(), interceptor);
    let state = AppState {
        registry: Arc::new(registry),
        interceptor_timeout: timeout,
        max_body_size: 1024 * 1024,
    };
    create_router(state)
}

fn post(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

const REQUEST: &str = r#"{
    "body": "{}",
    "header": {"X-GitHub-Event": ["push"]},
    "interceptorParams": {},
    "context": {
        "eventURL": "http://listener",
        "eventID": "e-1",
        "triggerID": "namespaces/ci/triggers/t"
    }
}"#;

// ============================================================================
// Dispatch
// ============================================================================

/// Verify that a registered interceptor receives the decoded request.
#[tokio::test]
async fn test_dispatch_to_registered_interceptor() {
    // Arrange
    let recorder = RecordingInterceptor::new(InterceptorResponse::allow());
    let app = app_with("cel", recorder.clone(), Duration::from_secs(3));

    // Act
    let response = app.oneshot(post("/cel", REQUEST)).await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, serde_json::json!({"continue": true}));
    let received = recorder.received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].context.event_id, "e-1");
    assert_eq!(received[0].header["X-GitHub-Event"], vec!["push".to_string()]);
}

#[tokio::test]
async fn test_rejection_is_returned_in_band() {
    let recorder = RecordingInterceptor::new(InterceptorResponse::fail(
        InterceptorStatus::FailedPrecondition,
        "expression body.value == 'test' did not return true",
    ));
    let app = app_with("cel", recorder, Duration::from_secs(3));

    let response = app.oneshot(post("/cel", REQUEST)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["continue"], false);
    assert_eq!(body["status"]["code"], 9);
}

#[tokio::test]
async fn test_path_is_normalized() {
    let recorder = RecordingInterceptor::new(InterceptorResponse::allow());
    let app = app_with("github", recorder.clone(), Duration::from_secs(3));

    let response = app.oneshot(post("/GitHub", REQUEST)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(recorder.calls(), 1);
}

#[tokio::test]
async fn test_unknown_interceptor_is_bad_request() {
    let recorder = RecordingInterceptor::new(InterceptorResponse::allow());
    let app = app_with("cel", recorder.clone(), Duration::from_secs(3));

    for path in ["/nope", "/cel/extra", "/"] {
        let response = app.clone().oneshot(post(path, REQUEST)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(json_body(response).await["error"], UNKNOWN_INTERCEPTOR_MESSAGE);
    }
    assert_eq!(recorder.calls(), 0);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let recorder = RecordingInterceptor::new(InterceptorResponse::allow());
    let app = app_with("cel", recorder.clone(), Duration::from_secs(3));

    let response = app.oneshot(post("/cel", "{not json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(recorder.calls(), 0);
}

#[tokio::test]
async fn test_timeout_is_internal_error() {
    let app = app_with("slow", Arc::new(StalledInterceptor), Duration::from_millis(50));

    let response = app.oneshot(post("/slow", REQUEST)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let recorder = RecordingInterceptor::new(InterceptorResponse::allow());
    let mut registry = InterceptorRegistry::new();
    registry.register(InterceptorName::new("cel").unwrap(), recorder.clone());
    let app = create_router(AppState {
        registry: Arc::new(registry),
        interceptor_timeout: Duration::from_secs(3),
        max_body_size: 16,
    });

    let response = app.oneshot(post("/cel", REQUEST)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(recorder.calls(), 0);
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_liveness_check() {
    let app = app_with("cel", Arc::new(StalledInterceptor), Duration::from_secs(3));

    let response = app
        .oneshot(Request::get("/live").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, serde_json::json!({"status": "ok"}));
}

#[tokio::test]
async fn test_wrong_method_is_bad_request() {
    let recorder = RecordingInterceptor::new(InterceptorResponse::allow());
    let app = app_with("cel", recorder.clone(), Duration::from_secs(3));

    let requests = [
        post("/live", REQUEST),
        post("/ready", REQUEST),
        Request::get("/cel").body(Body::empty()).unwrap(),
        Request::put("/cel").body(Body::from(REQUEST)).unwrap(),
        Request::delete("/live").body(Body::empty()).unwrap(),
    ];
    for request in requests {
        let target = format!("{} {}", request.method(), request.uri());
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{target}");
        assert_eq!(json_body(response).await["error"], UNKNOWN_INTERCEPTOR_MESSAGE);
    }
    assert_eq!(recorder.calls(), 0);
}

#[tokio::test]
async fn test_readiness_lists_interceptors() {
    let app = app_with("cel", Arc::new(StalledInterceptor), Duration::from_secs(3));

    let response = app
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({"status": "ok", "interceptors": ["cel"]})
    );
}

#[test]
fn test_app_state_from_server_config() {
    let config = ServerConfig::default();

    let state = AppState::new(InterceptorRegistry::new(), &config);

    assert_eq!(state.interceptor_timeout, Duration::from_secs(3));
    assert_eq!(state.max_body_size, 10 * 1024 * 1024);
}
