//! Tests for the CEL filter and overlay interceptor.

use super::*;
use crate::interceptors::test_support::{request, resolver_with};
use serde_json::json;

fn interceptor() -> CelInterceptor {
    let (resolver, _) = resolver_with(&[("ci", "hook", "token", "s3cr3t")]);
    CelInterceptor::new(resolver)
}

async fn run(
    body: &str,
    headers: &[(&str, &str)],
    params: serde_json::Value,
) -> InterceptorResponse {
    interceptor().process(&request(body, headers, params)).await
}

fn code(response: &InterceptorResponse) -> Option<StatusCode> {
    response.status.as_ref().map(|s| s.code)
}

#[tokio::test]
async fn test_matching_filter_continues_without_extensions() {
    let response = run(
        r#"{"value":"testing"}"#,
        &[],
        json!({"filter": "body.value == 'testing'"}),
    )
    .await;

    assert_eq!(response, InterceptorResponse::allow());
}

#[tokio::test]
async fn test_non_matching_filter_names_the_expression() {
    let response = run(
        r#"{"value":"testing"}"#,
        &[],
        json!({"filter": "body.value == 'test'"}),
    )
    .await;

    assert!(!response.continue_processing);
    let status = response.status.unwrap();
    assert_eq!(status.code, StatusCode::FailedPrecondition);
    assert!(status.message.contains("body.value == 'test'"), "{}", status.message);
}

#[tokio::test]
async fn test_non_boolean_filter_fails_precondition() {
    let response = run(r#"{"value":"testing"}"#, &[], json!({"filter": "body.value"})).await;

    assert_eq!(code(&response), Some(StatusCode::FailedPrecondition));
}

#[tokio::test]
async fn test_filter_errors_are_invalid_argument() {
    for filter in ["body.value ==", "undeclared == 1", "body.missing == 'x'", "body.value.nope()"] {
        let response = run(r#"{"value":"testing"}"#, &[], json!({"filter": filter})).await;
        assert_eq!(code(&response), Some(StatusCode::InvalidArgument), "{filter}");
    }
}

#[tokio::test]
async fn test_unparsable_body_is_invalid_argument() {
    let response = run("not json", &[], json!({"filter": "true"})).await;

    assert_eq!(code(&response), Some(StatusCode::InvalidArgument));
}

#[tokio::test]
async fn test_empty_body_is_an_empty_map() {
    let response = run("", &[], json!({"filter": "size(body) == 0"})).await;

    assert!(response.continue_processing);
}

#[tokio::test]
async fn test_malformed_params_are_invalid_argument() {
    let response = run("{}", &[], json!({"overlays": "short_sha"})).await;

    assert_eq!(code(&response), Some(StatusCode::InvalidArgument));
}

/// Verify the `short_sha` overlay writes the truncated commit.
#[tokio::test]
async fn test_short_sha_overlay() {
    // Arrange
    let body = r#"{"ref":"ec26c3e57ca3a959ca5aad62de7213c562f8c821"}"#;
    let params = json!({"overlays": [{"key": "short_sha", "expression": "body.ref.truncate(7)"}]});

    // Act
    let response = run(body, &[], params).await;

    // Assert
    assert!(response.continue_processing);
    assert_eq!(
        serde_json::Value::Object(response.extensions.unwrap()),
        json!({"short_sha": "ec26c3e"})
    );
}

#[tokio::test]
async fn test_overlays_use_dotted_paths_in_order() {
    let params = json!({
        "overlays": [
            {"key": "git.sha", "expression": "body.sha"},
            {"key": "git.count", "expression": "2.0 * 2.0"},
            {"key": "file\\.name", "expression": "b'hi'"},
            {"key": "git.sha", "expression": "body.sha.upperAscii()"}
        ]
    });

    let response = run(r#"{"sha":"abc"}"#, &[], params).await;

    assert_eq!(
        serde_json::Value::Object(response.extensions.unwrap()),
        json!({"git": {"sha": "ABC", "count": 4}, "file.name": "aGk="})
    );
}

#[tokio::test]
async fn test_overlay_evaluation_error_is_invalid_argument() {
    let params = json!({"overlays": [{"key": "x", "expression": "body.missing"}]});

    let response = run("{}", &[], params).await;

    assert_eq!(code(&response), Some(StatusCode::InvalidArgument));
}

#[tokio::test]
async fn test_overlay_conversion_error_is_internal() {
    let params = json!({"overlays": [{"key": "x", "expression": "0.0 / 0.0"}]});

    let response = run("{}", &[], params).await;

    assert_eq!(code(&response), Some(StatusCode::Internal));
}

#[tokio::test]
async fn test_filter_sees_headers_and_extensions() {
    let mut req = request(
        "{}",
        &[("x-github-event", "pull_request")],
        json!({"filter": "header.match('X-GitHub-Event', 'pull_request') && extensions.ready"}),
    );
    req.extensions.insert("ready".to_string(), json!(true));

    let response = interceptor().process(&req).await;

    assert!(response.continue_processing, "{response:?}");
}

#[tokio::test]
async fn test_request_url_is_bound() {
    let response = run(
        "{}",
        &[],
        json!({"filter": "requestURL.parseURL().host == 'hooks.example.com'"}),
    )
    .await;

    assert!(response.continue_processing, "{response:?}");
}

#[tokio::test]
async fn test_compare_secret_uses_trigger_namespace() {
    let params = json!({"filter": "header.canonical('X-Token').compareSecret('token', 'hook')"});

    let accepted = run("{}", &[("X-Token", "s3cr3t")], params.clone()).await;
    let rejected = run("{}", &[("X-Token", "guess")], params).await;

    assert!(accepted.continue_processing, "{accepted:?}");
    assert_eq!(code(&rejected), Some(StatusCode::FailedPrecondition));
}

#[tokio::test]
async fn test_compare_secret_missing_secret_is_invalid_argument() {
    let params = json!({"filter": "'x'.compareSecret('token', 'absent')"});

    let response = run("{}", &[], params).await;

    assert_eq!(code(&response), Some(StatusCode::InvalidArgument));
}

#[tokio::test]
async fn test_compare_secret_with_computed_arguments() {
    let params = json!({"filter": "'s3cr3t'.compareSecret('token', body.name)"});

    let response = run(r#"{"name":"hook"}"#, &[], params).await;

    assert_eq!(response, InterceptorResponse::allow());
}

#[tokio::test]
async fn test_overlay_compare_secret_with_computed_arguments() {
    let params = json!({
        "overlays": [{
            "key": "authorized",
            "expression": "body.token.compareSecret(body.key, 'hook')"
        }]
    });

    let response = run(r#"{"token":"s3cr3t","key":"token"}"#, &[], params).await;

    assert_eq!(
        serde_json::Value::Object(response.extensions.unwrap()),
        json!({"authorized": true})
    );
}

#[tokio::test]
async fn test_long_operator_chain_is_rejected() {
    let filter = format!("{}1 == 1", "1 + ".repeat(50_000));

    let response = run("{}", &[], json!({"filter": filter})).await;

    assert_eq!(code(&response), Some(StatusCode::InvalidArgument));
    assert!(
        response.status.unwrap().message.contains("nested too deeply"),
        "long chains are refused while parsing"
    );
}

#[test]
fn test_split_path() {
    assert_eq!(split_path("a.b"), vec!["a", "b"]);
    assert_eq!(split_path("a\\.b.c"), vec!["a.b", "c"]);
    assert_eq!(split_path("single"), vec!["single"]);
}

#[test]
fn test_set_path_replaces_scalar_parents() {
    let mut target = JsonMap::new();
    target.insert("a".to_string(), json!("scalar"));

    set_path(&mut target, &split_path("a.b"), json!(1));

    assert_eq!(serde_json::Value::Object(target), json!({"a": {"b": 1}}));
}
