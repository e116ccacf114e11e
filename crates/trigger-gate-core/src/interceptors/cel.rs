//! CEL filter and overlay interceptor.
//!
//! A boolean `filter` decides whether the event continues; each overlay
//! evaluates an expression and writes the result at a dotted path in the
//! extensions.
//!
//! ```yaml
//! interceptorParams:
//!   filter: "header.match('X-GitHub-Event', 'pull_request')"
//!   overlays:
//!     - key: short_sha
//!       expression: "body.pull_request.head.sha.truncate(7)"
//! ```

use super::{parse_params, Interceptor, InterceptorRequest, InterceptorResponse, JsonMap};
use crate::{
    cel::{parse_body, Activation, Program, SecretBindings, SecretLookup, Value},
    secrets::SecretResolver,
    StatusCode,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// A named expression whose result is written to the extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overlay {
    /// Dotted path in the extensions; `\.` is a literal dot.
    pub key: String,
    pub expression: String,
}

#[derive(Debug, Default, Deserialize)]
struct CelParams {
    #[serde(default)]
    filter: String,

    #[serde(default)]
    overlays: Option<Vec<Overlay>>,
}

/// Filters events and computes overlays with CEL expressions.
#[derive(Clone)]
pub struct CelInterceptor {
    resolver: SecretResolver,
}

impl CelInterceptor {
    pub fn new(resolver: SecretResolver) -> Self {
        Self { resolver }
    }

    /// Resolve the secrets named by literal `compareSecret` arguments.
    async fn bind_secrets(
        &self,
        programs: &[&Program],
        request: &InterceptorRequest,
    ) -> SecretBindings {
        let lookups: Vec<SecretLookup> = programs
            .iter()
            .flat_map(|p| p.secret_lookups().iter().cloned())
            .collect();
        if lookups.is_empty() {
            return SecretBindings::default();
        }
        SecretBindings::resolve(&lookups, &self.resolver, request.context.namespace()).await
    }
}

#[async_trait]
impl Interceptor for CelInterceptor {
    #[instrument(skip(self, request), fields(event_id = %request.context.event_id))]
    async fn process(&self, request: &InterceptorRequest) -> InterceptorResponse {
        let params: CelParams = match parse_params(&request.interceptor_params) {
            Ok(params) => params,
            Err(e) => return InterceptorResponse::fail(StatusCode::InvalidArgument, e.to_string()),
        };
        let overlays = params.overlays.unwrap_or_default();

        let body = match parse_body(&request.body) {
            Ok(body) => body,
            Err(e) => return InterceptorResponse::fail(StatusCode::InvalidArgument, e.to_string()),
        };

        let filter = if params.filter.is_empty() {
            None
        } else {
            match Program::compile(&params.filter) {
                Ok(program) => Some(program),
                Err(e) => {
                    return InterceptorResponse::fail(
                        StatusCode::InvalidArgument,
                        format!("error parsing cel expression \"{}\": {e}", params.filter),
                    )
                }
            }
        };

        let mut compiled = Vec::with_capacity(overlays.len());
        for overlay in &overlays {
            if overlay.key.is_empty() {
                return InterceptorResponse::fail(
                    StatusCode::InvalidArgument,
                    "overlay key must not be empty",
                );
            }
            match Program::compile(&overlay.expression) {
                Ok(program) => compiled.push((overlay.key.as_str(), program)),
                Err(e) => {
                    return InterceptorResponse::fail(
                        StatusCode::InvalidArgument,
                        format!("error parsing overlay \"{}\" expression: {e}", overlay.key),
                    )
                }
            }
        }

        let programs: Vec<&Program> = filter
            .iter()
            .chain(compiled.iter().map(|(_, p)| p))
            .collect();
        let secrets = self.bind_secrets(&programs, request).await;
        let namespace = request.context.namespace();
        let mut activation = Activation::new(
            body,
            &request.header,
            &request.extensions,
            &request.context.event_url,
        )
        .with_secrets(secrets);

        if let Some(filter) = &filter {
            let result = filter
                .evaluate_resolving(&mut activation, &self.resolver, namespace)
                .await;
            match result {
                Ok(Value::Bool(true)) => {}
                Ok(_) => {
                    debug!(filter = filter.source(), "Filter did not match");
                    return InterceptorResponse::fail(
                        StatusCode::FailedPrecondition,
                        format!("expression {} did not return true", filter.source()),
                    );
                }
                Err(e) => {
                    return InterceptorResponse::fail(
                        StatusCode::InvalidArgument,
                        format!("error evaluating cel expression: {e}"),
                    )
                }
            }
        }

        if compiled.is_empty() {
            return InterceptorResponse::allow();
        }

        let mut extensions = JsonMap::new();
        for (key, program) in &compiled {
            let result = program
                .evaluate_resolving(&mut activation, &self.resolver, namespace)
                .await;
            let value = match result {
                Ok(value) => value,
                Err(e) => {
                    return InterceptorResponse::fail(
                        StatusCode::InvalidArgument,
                        format!(
                            "failed to evaluate overlay expression '{}': {e}",
                            program.source()
                        ),
                    )
                }
            };
            let json = match value.to_json() {
                Ok(json) => json,
                Err(e) => {
                    return InterceptorResponse::fail(
                        StatusCode::Internal,
                        format!("failed to convert overlay result for '{key}': {e}"),
                    )
                }
            };
            set_path(&mut extensions, &split_path(key), json);
        }

        InterceptorResponse::allow_with_extensions(extensions)
    }
}

/// Split a dotted path; `\.` stays a literal dot inside a segment.
pub(crate) fn split_path(key: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('.');
                chars.next();
            }
            '.' => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

/// Set `value` at `path`, replacing non-object intermediates with objects.
pub(crate) fn set_path(target: &mut JsonMap, path: &[String], value: serde_json::Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = target;
    for segment in parents {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| serde_json::Value::Object(JsonMap::new()));
        if !entry.is_object() {
            *entry = serde_json::Value::Object(JsonMap::new());
        }
        current = match entry {
            serde_json::Value::Object(map) => map,
            _ => return,
        };
    }
    current.insert(last.clone(), value);
}

#[cfg(test)]
#[path = "cel_tests.rs"]
mod tests;
