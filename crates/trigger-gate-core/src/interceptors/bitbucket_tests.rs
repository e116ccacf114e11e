//! Tests for the Bitbucket verifier.

use super::*;
use crate::{
    interceptors::{
        signature::HmacAlgorithm,
        test_support::{request, resolver_with},
    },
    StatusCode,
};
use serde_json::json;

const BODY: &str = r#"{"push":{"changes":[]}}"#;

fn interceptor() -> BitbucketInterceptor {
    let (resolver, _) = resolver_with(&[("ci", "bb", "secret", "bitbucket")]);
    BitbucketInterceptor::new(resolver)
}

fn params() -> serde_json::Value {
    json!({
        "eventTypes": ["repo:push"],
        "secretRef": {"secretName": "bb", "secretKey": "secret"}
    })
}

#[tokio::test]
async fn test_valid_signature_continues() {
    let signature = HmacAlgorithm::Sha256.sign(b"bitbucket", BODY.as_bytes()).unwrap();
    let req = request(
        BODY,
        &[("X-Event-Key", "repo:push"), ("X-Hub-Signature", signature.as_str())],
        params(),
    );

    let response = interceptor().process(&req).await;

    assert_eq!(response, InterceptorResponse::allow());
}

#[tokio::test]
async fn test_tampered_body_fails_precondition() {
    let signature = HmacAlgorithm::Sha256.sign(b"bitbucket", BODY.as_bytes()).unwrap();
    let req = request(
        r#"{"push":{"changes":[1]}}"#,
        &[("X-Event-Key", "repo:push"), ("X-Hub-Signature", signature.as_str())],
        params(),
    );

    let response = interceptor().process(&req).await;

    assert_eq!(response.status.unwrap().code, StatusCode::FailedPrecondition);
}

#[tokio::test]
async fn test_unknown_event_key_is_rejected() {
    let req = request(BODY, &[("X-Event-Key", "pullrequest:created")], params());

    let response = interceptor().process(&req).await;

    assert_eq!(response.status.unwrap().code, StatusCode::FailedPrecondition);
}

#[tokio::test]
async fn test_github_style_fallback_header_is_not_read() {
    let signature = HmacAlgorithm::Sha256.sign(b"bitbucket", BODY.as_bytes()).unwrap();
    let req = request(
        BODY,
        &[("X-Event-Key", "repo:push"), ("X-Hub-Signature-256", signature.as_str())],
        params(),
    );

    let response = interceptor().process(&req).await;

    assert_eq!(response.status.unwrap().code, StatusCode::InvalidArgument);
}
