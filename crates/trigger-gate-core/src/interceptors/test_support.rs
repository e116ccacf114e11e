//! Builders shared by the interceptor tests.

use super::{InterceptorRequest, TriggerContext};
use crate::{
    adapters::InMemorySecretStore,
    secrets::{cache::SecretCache, SecretResolver},
};
use std::sync::Arc;

pub(crate) const TRIGGER_ID: &str = "namespaces/ci/triggers/on-push";

/// Resolver over an in-memory store holding `(namespace, name, key, value)` secrets.
pub(crate) fn resolver_with(
    secrets: &[(&str, &str, &str, &str)],
) -> (SecretResolver, Arc<SecretCache>) {
    let store = InMemorySecretStore::new();
    for (namespace, name, key, value) in secrets {
        store.insert_key(namespace, name, key, value.as_bytes());
    }
    let cache = Arc::new(SecretCache::with_defaults(Arc::new(store)));
    (SecretResolver::new(cache.clone(), "default"), cache)
}

/// Request with `body`, single-valued `headers` and `params`.
pub(crate) fn request(
    body: &str,
    headers: &[(&str, &str)],
    params: serde_json::Value,
) -> InterceptorRequest {
    InterceptorRequest {
        body: body.to_string(),
        header: headers
            .iter()
            .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
            .collect(),
        interceptor_params: params.as_object().cloned().unwrap_or_default(),
        extensions: serde_json::Map::new(),
        context: TriggerContext::new("https://hooks.example.com/ci", "evt-1", TRIGGER_ID),
    }
}
