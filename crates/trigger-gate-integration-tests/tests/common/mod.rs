//! Common test utilities for integration tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use trigger_gate_api::{create_router, AppState, InterceptorRegistry, ServerConfig, ServiceConfig};
use trigger_gate_core::{
    secrets::SecretResolver, InMemorySecretStore, SecretCache, SecretStore,
};

pub const TRIGGER_ID: &str = "namespaces/ci/triggers/on-push";
pub const EVENT_URL: &str = "https://hooks.example.com/ci";

// ============================================================================
// Service Builders
// ============================================================================

/// Secrets seeded into every test store as `(namespace, name, key, value)`.
pub const SEEDED_SECRETS: &[(&str, &str, &str, &str)] = &[
    ("ci", "github-hook", "token", "mysecret"),
    ("ci", "gitlab-hook", "token", "gitlab-token"),
    ("ci", "bitbucket-hook", "token", "bitbucket-secret"),
    ("ci", "slack-hook", "signing", "slack-signing-secret"),
    ("default", "shared", "token", "shared-secret"),
];

/// In-memory store holding [`SEEDED_SECRETS`].
pub fn seeded_store() -> Arc<InMemorySecretStore> {
    let store = InMemorySecretStore::new();
    for (namespace, name, key, value) in SEEDED_SECRETS {
        store.insert_key(namespace, name, key, value.as_bytes());
    }
    Arc::new(store)
}

/// Router serving every built-in interceptor over `store`.
pub fn router_with_store(store: Arc<dyn SecretStore>, server: &ServerConfig) -> Router {
    let cache = Arc::new(SecretCache::with_defaults(store));
    let resolver = SecretResolver::new(cache, "default");
    let registry =
        InterceptorRegistry::with_builtins(&ServiceConfig::default().interceptors, &resolver)
            .expect("built-in interceptors should register");
    create_router(AppState::new(registry, server))
}

/// Router serving every built-in interceptor over the seeded store.
pub fn test_router() -> Router {
    router_with_store(seeded_store(), &ServerConfig::default())
}

// ============================================================================
// Request Builders
// ============================================================================

/// Interceptor request body with single-valued headers.
pub fn interceptor_request(body: &str, headers: &[(&str, &str)], params: Value) -> Value {
    let header: serde_json::Map<String, Value> = headers
        .iter()
        .map(|(k, v)| (k.to_string(), json!([v])))
        .collect();
    json!({
        "body": body,
        "header": header,
        "interceptorParams": params,
        "extensions": {},
        "context": {
            "eventURL": EVENT_URL,
            "eventID": "evt-integration",
            "triggerID": TRIGGER_ID,
        },
    })
}

/// POST `payload` to `path` and return the status and decoded JSON body.
pub async fn post_json(app: Router, path: &str, payload: &Value) -> (StatusCode, Value) {
    post_raw(app, path, payload.to_string()).await
}

/// POST a raw body to `path` and return the status and decoded JSON body.
pub async fn post_raw(app: Router, path: &str, body: String) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

/// GET `path` and return the status and decoded JSON body.
pub async fn get_json(app: Router, path: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(path).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}
