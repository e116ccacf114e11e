//! Tests for the GitLab verifier.

use super::*;
use crate::{
    interceptors::test_support::{request, resolver_with},
    StatusCode,
};
use serde_json::json;

fn interceptor() -> GitLabInterceptor {
    let (resolver, _) = resolver_with(&[("ci", "gitlab-secret", "token", "s3cr3t")]);
    GitLabInterceptor::new(resolver)
}

fn params() -> serde_json::Value {
    json!({
        "eventTypes": ["Push Hook"],
        "secretRef": {"secretName": "gitlab-secret", "secretKey": "token"}
    })
}

#[tokio::test]
async fn test_matching_token_continues() {
    let req = request(
        "{}",
        &[("X-Gitlab-Event", "Push Hook"), ("X-Gitlab-Token", "s3cr3t")],
        params(),
    );

    let response = interceptor().process(&req).await;

    assert_eq!(response, InterceptorResponse::allow());
}

#[tokio::test]
async fn test_wrong_token_fails_precondition() {
    let req = request(
        "{}",
        &[("X-Gitlab-Event", "Push Hook"), ("X-Gitlab-Token", "guess")],
        params(),
    );

    let response = interceptor().process(&req).await;

    assert!(!response.continue_processing);
    let status = response.status.unwrap();
    assert_eq!(status.code, StatusCode::FailedPrecondition);
    assert!(!status.message.contains("s3cr3t"));
}

#[tokio::test]
async fn test_missing_token_header_is_invalid_argument() {
    let req = request("{}", &[("X-Gitlab-Event", "Push Hook")], params());

    let response = interceptor().process(&req).await;

    assert_eq!(response.status.unwrap().code, StatusCode::InvalidArgument);
}

#[tokio::test]
async fn test_disallowed_event_type() {
    let req = request(
        "{}",
        &[("X-Gitlab-Event", "Tag Push Hook"), ("X-Gitlab-Token", "s3cr3t")],
        params(),
    );

    let response = interceptor().process(&req).await;

    let status = response.status.unwrap();
    assert_eq!(status.code, StatusCode::FailedPrecondition);
    assert!(status.message.contains("Tag Push Hook"));
}
