//! Tests for secret references, values and the resolver.

use super::*;
use crate::secrets::cache::{ManualClock, SecretCacheConfig};
use mockall::predicate::eq;
use subtle::ConstantTimeEq;

fn resolver_over(store: MockSecretStore) -> SecretResolver {
    let cache = SecretCache::new(
        Arc::new(store),
        Arc::new(ManualClock::new()),
        SecretCacheConfig::default(),
    );
    SecretResolver::new(Arc::new(cache), "default")
}

fn token(value: &str) -> SecretData {
    let mut data = SecretData::new();
    data.insert("token".to_string(), SecretValue::from(value));
    data
}

#[test]
fn test_secret_value_debug_is_redacted() {
    let value = SecretValue::from_string("super-secret".to_string());
    let rendered = format!("{value:?}");

    assert!(rendered.contains("[REDACTED]"));
    assert!(!rendered.contains("super-secret"));
    assert_eq!(value.len(), 12);
    assert!(!value.is_empty());
}

#[test]
fn test_secret_ref_deserializes_camel_case() {
    let secret_ref: SecretRef = serde_json::from_str(
        r#"{"secretName":"mysecret","secretKey":"token","namespace":"team-a"}"#,
    )
    .unwrap();

    assert_eq!(
        secret_ref,
        SecretRef::new("mysecret", "token").with_namespace("team-a")
    );
}

#[test]
fn test_secret_ref_fields_default_to_empty() {
    let secret_ref: SecretRef = serde_json::from_str("{}").unwrap();

    assert!(secret_ref.secret_name.is_empty());
    assert!(secret_ref.secret_key.is_empty());
    assert_eq!(secret_ref.namespace, None);
}

#[test]
fn test_effective_namespace() {
    let plain = SecretRef::new("s", "k");
    let explicit = SecretRef::new("s", "k").with_namespace("team-a");
    let blank = SecretRef::new("s", "k").with_namespace("");

    assert_eq!(plain.effective_namespace("fallback"), "fallback");
    assert_eq!(explicit.effective_namespace("fallback"), "team-a");
    assert_eq!(blank.effective_namespace("fallback"), "fallback");
}

/// Verify the namespace precedence: explicit, then trigger, then default.
#[test]
fn test_resolver_namespace_precedence() {
    let resolver = resolver_over(MockSecretStore::new());
    let plain = SecretRef::new("s", "k");
    let explicit = SecretRef::new("s", "k").with_namespace("team-a");

    assert_eq!(resolver.namespace_for(&explicit, Some("trigger-ns")), "team-a");
    assert_eq!(resolver.namespace_for(&plain, Some("trigger-ns")), "trigger-ns");
    assert_eq!(resolver.namespace_for(&plain, None), "default");
    assert_eq!(resolver.namespace_for(&plain, Some("")), "default");
}

#[tokio::test]
async fn test_resolver_reads_from_trigger_namespace() {
    let mut store = MockSecretStore::new();
    store
        .expect_get_secret()
        .with(eq("trigger-ns"), eq("mysecret"))
        .times(1)
        .returning(|_, _| Ok(Some(token("secret"))));
    let resolver = resolver_over(store);

    let value = resolver
        .resolve(&SecretRef::new("mysecret", "token"), Some("trigger-ns"))
        .await
        .unwrap();

    assert_eq!(value.expose_bytes(), b"secret");
}

#[tokio::test]
async fn test_resolver_explicit_namespace_overrides_trigger() {
    let mut store = MockSecretStore::new();
    store
        .expect_get_secret()
        .with(eq("team-a"), eq("mysecret"))
        .times(1)
        .returning(|_, _| Ok(Some(token("secret"))));
    let resolver = resolver_over(store);
    let secret_ref = SecretRef::new("mysecret", "token").with_namespace("team-a");

    let value = resolver.resolve(&secret_ref, Some("trigger-ns")).await.unwrap();

    assert_eq!(value.expose_bytes(), b"secret");
}

#[test]
fn test_secret_error_messages_do_not_leak_values() {
    let err = SecretError::KeyNotFound {
        namespace: "ns".to_string(),
        name: "mysecret".to_string(),
        key: "token".to_string(),
    };

    assert_eq!(err.to_string(), "key token not found in secret ns/mysecret");
    assert!(err.is_not_found());
}

#[test]
fn test_secret_value_matches() {
    let value = SecretValue::from("secret");

    assert!(value.matches(b"secret"));
    assert!(!value.matches(b"secreT"));
    assert!(!value.matches(b"secret-longer"));
    assert!(!value.matches(b""));
}

#[test]
fn test_secret_value_matches_agrees_with_constant_time_eq() {
    let value = SecretValue::from("secret");

    for candidate in [&b"secret"[..], b"xecret", b"secrex", b"secre", b"secrets", b""] {
        let expected: bool = b"secret".as_slice().ct_eq(candidate).into();

        assert_eq!(value.matches(candidate), expected, "{candidate:?}");
    }
}
