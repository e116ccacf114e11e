//! Webhook specific extension functions.
//!
//! `compareSecret` needs the secret cache, which is asynchronous, while
//! evaluation is not. The function reads from [`SecretBindings`] and fails
//! with `CelError::UnresolvedSecret` for a secret that is not bound yet;
//! `Program::evaluate_resolving` binds it and evaluates again.

use super::{
    functions::{compile_regex, eval_error, no_overload},
    value::{Value, ValueMap},
    CelError,
};
use crate::{
    headers::canonical_header_key,
    secrets::{SecretError, SecretRef, SecretResolver, SecretValue},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use url::Url;

// ============================================================================
// Secret bindings
// ============================================================================

/// Arguments of one `compareSecret` call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretLookup {
    pub secret_key: String,
    pub secret_name: String,
    pub namespace: Option<String>,
}

impl SecretLookup {
    /// The secret reference this lookup resolves.
    pub fn secret_ref(&self) -> SecretRef {
        SecretRef {
            secret_name: self.secret_name.clone(),
            secret_key: self.secret_key.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

/// Secrets resolved ahead of evaluation, keyed by `compareSecret` arguments.
///
/// Failed resolutions are kept as their error message so that the error only
/// surfaces if the call is actually evaluated.
#[derive(Debug, Clone, Default)]
pub struct SecretBindings {
    resolved: HashMap<SecretLookup, Result<SecretValue, String>>,
}

impl SecretBindings {
    /// Resolve every lookup through `resolver`.
    pub async fn resolve(
        lookups: &[SecretLookup],
        resolver: &SecretResolver,
        trigger_namespace: Option<&str>,
    ) -> Self {
        let mut bindings = Self::default();
        for lookup in lookups {
            if bindings.resolved.contains_key(lookup) {
                continue;
            }
            let result = resolver.resolve(&lookup.secret_ref(), trigger_namespace).await;
            bindings.insert(lookup.clone(), result);
        }
        bindings
    }

    /// Record the outcome of resolving `lookup`.
    pub fn insert(&mut self, lookup: SecretLookup, result: Result<SecretValue, SecretError>) {
        if let Err(e) = &result {
            debug!(secret_name = %lookup.secret_name, error = %e, "compareSecret lookup failed");
        }
        self.resolved
            .insert(lookup, result.map_err(|e| e.to_string()));
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Whether `name` is implemented in this module.
pub(crate) fn handles(name: &str) -> bool {
    matches!(
        name,
        "match"
            | "canonical"
            | "truncate"
            | "split"
            | "compareSecret"
            | "decodeb64"
            | "decodeB64"
            | "parseJSON"
            | "parseYAML"
            | "parseURL"
            | "marshalJSON"
            | "translate"
    )
}

pub(crate) fn call_member(
    name: &str,
    target: &Value,
    args: &[Value],
    secrets: &SecretBindings,
) -> Result<Value, CelError> {
    match (name, target, args) {
        ("match", Value::Map(headers), [Value::String(key), Value::String(expected)]) => Ok(
            Value::Bool(first_header(headers, key).is_some_and(|v| v == *expected)),
        ),
        ("canonical", Value::Map(headers), [Value::String(key)]) => {
            Ok(Value::String(first_header(headers, key).unwrap_or_default()))
        }
        ("truncate", Value::String(s), [Value::Int(n)]) => Ok(Value::String(truncate(s, *n))),
        ("split", Value::String(s), [Value::String(sep)]) => Ok(split(s, sep, -1)),
        ("split", Value::String(s), [Value::String(sep), Value::Int(n)]) => Ok(split(s, sep, *n)),
        (
            "compareSecret",
            Value::String(candidate),
            [Value::String(key), Value::String(secret_name)],
        ) => compare_secret(secrets, candidate, key, secret_name, None),
        (
            "compareSecret",
            Value::String(candidate),
            [Value::String(key), Value::String(secret_name), Value::String(namespace)],
        ) => compare_secret(secrets, candidate, key, secret_name, Some(namespace)),
        ("decodeb64" | "decodeB64", Value::String(s), []) => STANDARD
            .decode(s)
            .map(Value::Bytes)
            .map_err(|e| eval_error(format!("{name}: {e}"))),
        ("parseJSON", Value::String(s), []) => parse_json(s),
        ("parseYAML", Value::String(s), []) => parse_yaml(s),
        ("parseURL", Value::String(s), []) => parse_url(s),
        ("marshalJSON", Value::Map(_) | Value::List(_), []) => marshal_json(target),
        ("translate", Value::String(s), [Value::String(pattern), Value::String(replacement)]) => {
            let re = compile_regex(pattern)?;
            Ok(Value::String(re.replace_all(s, replacement.as_str()).into_owned()))
        }
        _ => Err(no_overload(name, Some(target), args)),
    }
}

// ============================================================================
// Implementations
// ============================================================================

/// First value of the header whose canonical name matches `key`.
fn first_header(headers: &ValueMap, key: &str) -> Option<String> {
    let canonical = canonical_header_key(key);
    let values = headers.get(&canonical).or_else(|| {
        headers
            .iter()
            .find(|(name, _)| canonical_header_key(name) == canonical)
            .map(|(_, v)| v)
    })?;
    match values {
        Value::List(items) => items.first().and_then(Value::as_str).map(str::to_string),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn truncate(s: &str, n: i64) -> String {
    match usize::try_from(n) {
        Ok(n) => s.chars().take(n).collect(),
        Err(_) => String::new(),
    }
}

/// Split with Go `SplitN` limit semantics: negative means no limit, zero
/// yields an empty list.
fn split(s: &str, sep: &str, limit: i64) -> Value {
    let parts: Vec<String> = match usize::try_from(limit) {
        Ok(0) => Vec::new(),
        Ok(n) if sep.is_empty() => {
            let mut chars: Vec<String> = s.chars().map(String::from).collect();
            if chars.len() > n {
                let rest: String = chars.split_off(n - 1).concat();
                chars.push(rest);
            }
            chars
        }
        Ok(n) => s.splitn(n, sep).map(str::to_string).collect(),
        Err(_) if sep.is_empty() => s.chars().map(String::from).collect(),
        Err(_) => s.split(sep).map(str::to_string).collect(),
    };
    Value::list(parts.into_iter().map(Value::String).collect())
}

fn compare_secret(
    secrets: &SecretBindings,
    candidate: &str,
    secret_key: &str,
    secret_name: &str,
    namespace: Option<&str>,
) -> Result<Value, CelError> {
    let lookup = SecretLookup {
        secret_key: secret_key.to_string(),
        secret_name: secret_name.to_string(),
        namespace: namespace.map(str::to_string),
    };
    match secrets.resolved.get(&lookup) {
        Some(Ok(secret)) => Ok(Value::Bool(secret.matches(candidate.as_bytes()))),
        Some(Err(message)) => Err(eval_error(format!("compareSecret: {message}"))),
        None => Err(CelError::UnresolvedSecret { lookup }),
    }
}

fn object_value(json: serde_json::Value, function: &str) -> Result<Value, CelError> {
    match json {
        serde_json::Value::Object(_) => Ok(Value::from_json(&json)),
        other => Err(eval_error(format!(
            "{function}: document is not an object but {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "an object",
    }
}

fn parse_json(s: &str) -> Result<Value, CelError> {
    let json: serde_json::Value =
        serde_json::from_str(s).map_err(|e| eval_error(format!("parseJSON: {e}")))?;
    object_value(json, "parseJSON")
}

fn parse_yaml(s: &str) -> Result<Value, CelError> {
    let json: serde_json::Value =
        serde_yaml::from_str(s).map_err(|e| eval_error(format!("parseYAML: {e}")))?;
    object_value(json, "parseYAML")
}

/// Base that references without a scheme are resolved against. Its scheme
/// and host are never reported.
const REFERENCE_BASE: &str = "reference:///";

fn parse_url(s: &str) -> Result<Value, CelError> {
    let raw = s.trim_matches(|c: char| c <= ' ');
    let (url, is_reference) = match Url::parse(raw) {
        Ok(url) => (url, false),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let url = Url::parse(REFERENCE_BASE)
                .and_then(|base| base.join(raw))
                .map_err(|e| eval_error(format!("parseURL: {e}")))?;
            (url, true)
        }
        Err(e) => return Err(eval_error(format!("parseURL: {e}"))),
    };

    let scheme = if is_reference { "" } else { url.scheme() };
    let authority = authority(raw, scheme);
    // Taken from the input so that an explicit default port is kept.
    let host = authority
        .map(|a| a.rsplit_once('@').map_or(a, |(_, host)| host))
        .unwrap_or_default();
    let path = if is_reference {
        reference_path(raw, authority)
    } else {
        url.path()
    };

    let mut query_strings: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in url.query_pairs() {
        query_strings
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }

    let query: ValueMap = query_strings
        .iter()
        .map(|(k, values)| (k.clone(), Value::String(values.join(","))))
        .collect();
    let query_strings: ValueMap = query_strings
        .into_iter()
        .map(|(k, values)| {
            let values = values.into_iter().map(Value::String).collect();
            (k, Value::list(values))
        })
        .collect();

    let mut parsed = ValueMap::new();
    parsed.insert("scheme".to_string(), Value::string(scheme));
    parsed.insert("host".to_string(), Value::string(host));
    parsed.insert("path".to_string(), Value::String(unescape(path)?));
    parsed.insert(
        "rawQuery".to_string(),
        Value::string(url.query().unwrap_or_default()),
    );
    parsed.insert(
        "fragment".to_string(),
        Value::string(url.fragment().unwrap_or_default()),
    );
    parsed.insert("queryStrings".to_string(), Value::map(query_strings));
    parsed.insert("query".to_string(), Value::map(query));

    if !url.username().is_empty() || url.password().is_some() {
        let mut auth = ValueMap::new();
        auth.insert(
            "username".to_string(),
            Value::String(unescape(url.username())?),
        );
        auth.insert(
            "password".to_string(),
            Value::String(unescape(url.password().unwrap_or_default())?),
        );
        parsed.insert("auth".to_string(), Value::map(auth));
    }

    Ok(Value::map(parsed))
}

/// The `//authority` part of `raw` following `scheme`, without the slashes.
fn authority<'a>(raw: &'a str, scheme: &str) -> Option<&'a str> {
    let rest = raw.get(scheme.len()..)?;
    let rest = if scheme.is_empty() {
        rest
    } else {
        rest.strip_prefix(':')?
    };
    let rest = rest.strip_prefix("//")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Path of a reference as written, without dot segment normalisation.
fn reference_path<'a>(raw: &'a str, authority: Option<&str>) -> &'a str {
    let rest = match authority {
        Some(a) => raw.get(a.len() + 2..).unwrap_or_default(),
        None => raw,
    };
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    &rest[..end]
}

fn unescape(component: &str) -> Result<String, CelError> {
    urlencoding::decode(component)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| eval_error(format!("parseURL: invalid escape in '{component}': {e}")))
}

fn marshal_json(value: &Value) -> Result<Value, CelError> {
    let json = value
        .to_json()
        .map_err(|e| eval_error(format!("marshalJSON: {e}")))?;
    serde_json::to_string(&json)
        .map(Value::String)
        .map_err(|e| eval_error(format!("marshalJSON: {e}")))
}

#[cfg(test)]
#[path = "extensions_tests.rs"]
mod tests;
