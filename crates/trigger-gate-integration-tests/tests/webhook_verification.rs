//! Integration tests for provider signature verification over HTTP

mod common;

use axum::http::StatusCode;
use common::{interceptor_request, post_json, test_router};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use trigger_gate_core::{interceptors::signature::HmacAlgorithm, StatusCode as Code};

const PUSH_BODY: &str = r#"{"ref":"refs/heads/main","head_commit":{"id":"1f2e3d4c5b6a"}}"#;

fn secret_ref(name: &str, key: &str) -> Value {
    json!({"secretName": name, "secretKey": key})
}

fn assert_rejected(body: &Value, code: Code) {
    assert_eq!(body["continue"], json!(false), "{body}");
    assert_eq!(body["status"]["code"], json!(code.as_i32()), "{body}");
}

// ============================================================================
// GitHub
// ============================================================================

/// Verify that a correctly signed GitHub delivery continues
#[tokio::test]
async fn test_github_signed_delivery_continues() {
    // Arrange
    let signature = HmacAlgorithm::Sha1.sign(b"mysecret", b"foo").unwrap();
    let payload = interceptor_request(
        "foo",
        &[("X-GitHub-Event", "push"), ("X-Hub-Signature", signature.as_str())],
        json!({"secretRef": secret_ref("github-hook", "token"), "eventTypes": ["push"]}),
    );

    // Act
    let (status, body) = post_json(test_router(), "/github", &payload).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"continue": true}));
}

/// Verify that a forged GitHub signature is rejected in-band
#[tokio::test]
async fn test_github_forged_signature_is_rejected() {
    let signature = HmacAlgorithm::Sha256.sign(b"not-the-secret", PUSH_BODY.as_bytes()).unwrap();
    let payload = interceptor_request(
        PUSH_BODY,
        &[("X-GitHub-Event", "push"), ("X-Hub-Signature-256", signature.as_str())],
        json!({"secretRef": secret_ref("github-hook", "token")}),
    );

    let (status, body) = post_json(test_router(), "/github", &payload).await;

    assert_eq!(status, StatusCode::OK);
    assert_rejected(&body, Code::FailedPrecondition);
}

/// Verify that a disallowed event type stops the delivery
#[tokio::test]
async fn test_github_event_type_filter() {
    let payload = interceptor_request(
        PUSH_BODY,
        &[("X-GitHub-Event", "issues")],
        json!({"eventTypes": ["push", "pull_request"]}),
    );

    let (_, body) = post_json(test_router(), "/github", &payload).await;

    assert_rejected(&body, Code::FailedPrecondition);
    assert_eq!(body["status"]["message"], json!("event type issues is not allowed"));
}

/// Verify that a secret missing from the store is reported as not found
#[tokio::test]
async fn test_github_missing_secret() {
    let signature = HmacAlgorithm::Sha256.sign(b"mysecret", PUSH_BODY.as_bytes()).unwrap();
    let payload = interceptor_request(
        PUSH_BODY,
        &[("X-GitHub-Event", "push"), ("X-Hub-Signature-256", signature.as_str())],
        json!({"secretRef": secret_ref("does-not-exist", "token")}),
    );

    let (_, body) = post_json(test_router(), "/github", &payload).await;

    assert_rejected(&body, Code::NotFound);
}

/// Verify that an explicit secret namespace overrides the trigger namespace
#[tokio::test]
async fn test_github_explicit_secret_namespace() {
    let signature = HmacAlgorithm::Sha256.sign(b"shared-secret", PUSH_BODY.as_bytes()).unwrap();
    let payload = interceptor_request(
        PUSH_BODY,
        &[("X-GitHub-Event", "push"), ("X-Hub-Signature-256", signature.as_str())],
        json!({
            "secretRef": {"secretName": "shared", "secretKey": "token", "namespace": "default"}
        }),
    );

    let (_, body) = post_json(test_router(), "/github", &payload).await;

    assert_eq!(body["continue"], json!(true), "{body}");
}

// ============================================================================
// GitLab
// ============================================================================

/// Verify GitLab token matching
#[tokio::test]
async fn test_gitlab_token() {
    let params = json!({
        "secretRef": secret_ref("gitlab-hook", "token"),
        "eventTypes": ["Push Hook"]
    });

    let valid = interceptor_request(
        PUSH_BODY,
        &[("X-Gitlab-Event", "Push Hook"), ("X-Gitlab-Token", "gitlab-token")],
        params.clone(),
    );
    let (_, body) = post_json(test_router(), "/gitlab", &valid).await;
    assert_eq!(body["continue"], json!(true), "{body}");

    let invalid = interceptor_request(
        PUSH_BODY,
        &[("X-Gitlab-Event", "Push Hook"), ("X-Gitlab-Token", "guess")],
        params,
    );
    let (_, body) = post_json(test_router(), "/gitlab", &invalid).await;
    assert_rejected(&body, Code::FailedPrecondition);
}

/// Verify that a missing GitLab token header is an invalid argument
#[tokio::test]
async fn test_gitlab_missing_token_header() {
    let payload = interceptor_request(
        PUSH_BODY,
        &[("X-Gitlab-Event", "Push Hook")],
        json!({"secretRef": secret_ref("gitlab-hook", "token")}),
    );

    let (_, body) = post_json(test_router(), "/gitlab", &payload).await;

    assert_rejected(&body, Code::InvalidArgument);
}

// ============================================================================
// Bitbucket
// ============================================================================

/// Verify Bitbucket signature checking
#[tokio::test]
async fn test_bitbucket_signature() {
    let signature = HmacAlgorithm::Sha256
        .sign(b"bitbucket-secret", PUSH_BODY.as_bytes())
        .unwrap();
    let payload = interceptor_request(
        PUSH_BODY,
        &[("X-Event-Key", "repo:push"), ("X-Hub-Signature", signature.as_str())],
        json!({"secretRef": secret_ref("bitbucket-hook", "token"), "eventTypes": ["repo:push"]}),
    );

    let (_, body) = post_json(test_router(), "/bitbucket", &payload).await;

    assert_eq!(body["continue"], json!(true), "{body}");
}

// ============================================================================
// Slack
// ============================================================================

/// Verify that a signed Slack command is decoded into extensions
#[tokio::test]
async fn test_slack_signed_command() {
    // Arrange
    let form = "command=%2Fdeploy&text=prod+now&user_id=U1";
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let signature = HmacAlgorithm::Sha256
        .sign(
            b"slack-signing-secret",
            format!("v0:{timestamp}:{form}").as_bytes(),
        )
        .unwrap()
        .replacen("sha256=", "v0=", 1);
    let timestamp = timestamp.to_string();
    let payload = interceptor_request(
        form,
        &[
            ("Content-Type", "application/x-www-form-urlencoded"),
            ("X-Slack-Signature", signature.as_str()),
            ("X-Slack-Request-Timestamp", timestamp.as_str()),
        ],
        json!({
            "requestedFields": ["command", "text"],
            "secretRef": secret_ref("slack-hook", "signing"),
        }),
    );

    // Act
    let (_, body) = post_json(test_router(), "/slack", &payload).await;

    // Assert
    assert_eq!(
        body,
        json!({
            "continue": true,
            "extensions": {"slack": {"command": "/deploy", "text": "prod now"}}
        })
    );
}

/// Verify that a stale Slack timestamp is unauthenticated
#[tokio::test]
async fn test_slack_stale_timestamp() {
    let form = "text=hello";
    let signature = HmacAlgorithm::Sha256
        .sign(b"slack-signing-secret", format!("v0:1000:{form}").as_bytes())
        .unwrap()
        .replacen("sha256=", "v0=", 1);
    let payload = interceptor_request(
        form,
        &[
            ("Content-Type", "application/x-www-form-urlencoded"),
            ("X-Slack-Signature", signature.as_str()),
            ("X-Slack-Request-Timestamp", "1000"),
        ],
        json!({"secretRef": secret_ref("slack-hook", "signing")}),
    );

    let (_, body) = post_json(test_router(), "/slack", &payload).await;

    assert_rejected(&body, Code::Unauthenticated);
}
