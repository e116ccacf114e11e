//! Slack slash-command and interaction decoder.
//!
//! Slack posts `application/x-www-form-urlencoded` bodies. Requested form
//! fields are copied to `extensions.slack.<field>`; the `payload` field of
//! interactive messages holds JSON and is decoded into a structured value.
//! With a `secretRef` the request is first checked against the Slack signing
//! secret.

use super::{
    parse_params,
    signature::{resolve_secret, HmacAlgorithm},
    Interceptor, InterceptorRequest, InterceptorResponse, JsonMap,
};
use crate::{
    headers::{first_header_value, media_type},
    secrets::{SecretRef, SecretResolver},
    StatusCode,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument};

const FORM_MEDIA_TYPE: &str = "application/x-www-form-urlencoded";
const SIGNATURE_HEADER: &str = "X-Slack-Signature";
const TIMESTAMP_HEADER: &str = "X-Slack-Request-Timestamp";

/// Requests signed further than this from now are rejected.
pub const MAX_SKEW: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlackParams {
    #[serde(default)]
    requested_fields: Option<Vec<String>>,

    #[serde(default)]
    secret_ref: Option<SecretRef>,
}

/// Decodes Slack form posts into extensions.
#[derive(Clone)]
pub struct SlackInterceptor {
    resolver: SecretResolver,
}

impl SlackInterceptor {
    pub fn new(resolver: SecretResolver) -> Self {
        Self { resolver }
    }

    async fn verify_signature(
        &self,
        secret_ref: &SecretRef,
        request: &InterceptorRequest,
    ) -> Result<(), InterceptorResponse> {
        let header = |name: &str| {
            first_header_value(&request.header, name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    InterceptorResponse::fail(
                        StatusCode::InvalidArgument,
                        format!("no {name} header set"),
                    )
                })
        };
        let signature = header(SIGNATURE_HEADER)?;
        let timestamp = header(TIMESTAMP_HEADER)?;

        let sent_at: i64 = timestamp.trim().parse().map_err(|_| {
            InterceptorResponse::fail(
                StatusCode::InvalidArgument,
                format!("{TIMESTAMP_HEADER} is not a unix timestamp: {timestamp}"),
            )
        })?;
        let skew = Utc::now().timestamp().abs_diff(sent_at);
        if skew > MAX_SKEW.as_secs() {
            debug!(skew_seconds = skew, "Slack request timestamp outside the accepted window");
            return Err(InterceptorResponse::fail(
                StatusCode::Unauthenticated,
                "slack request timestamp is too old",
            ));
        }

        let secret = resolve_secret(&self.resolver, secret_ref, request).await?;

        let base = format!("v0:{timestamp}:{}", request.body);
        let expected = HmacAlgorithm::Sha256
            .sign(secret.expose_bytes(), base.as_bytes())
            .map_err(|e| InterceptorResponse::fail(StatusCode::Internal, e.to_string()))?;
        let expected = expected.replacen("sha256=", "v0=", 1);

        if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            Ok(())
        } else {
            Err(InterceptorResponse::fail(
                StatusCode::FailedPrecondition,
                "slack signature check failed: signature does not match",
            ))
        }
    }
}

#[async_trait]
impl Interceptor for SlackInterceptor {
    #[instrument(skip(self, request), fields(event_id = %request.context.event_id))]
    async fn process(&self, request: &InterceptorRequest) -> InterceptorResponse {
        let content_type = first_header_value(&request.header, "Content-Type").unwrap_or_default();
        if media_type(content_type) != FORM_MEDIA_TYPE {
            return InterceptorResponse::fail(
                StatusCode::InvalidArgument,
                format!("unsupported content type '{content_type}', expected {FORM_MEDIA_TYPE}"),
            );
        }

        let params: SlackParams = match parse_params(&request.interceptor_params) {
            Ok(params) => params,
            Err(e) => return InterceptorResponse::fail(StatusCode::InvalidArgument, e.to_string()),
        };

        if let Some(secret_ref) = &params.secret_ref {
            if let Err(response) = self.verify_signature(secret_ref, request).await {
                return response;
            }
        }

        let requested = params.requested_fields.unwrap_or_default();
        if requested.is_empty() {
            return InterceptorResponse::allow();
        }

        let fields = decode_fields(&request.body, &requested);
        if fields.is_empty() {
            return InterceptorResponse::allow();
        }

        let mut extensions = JsonMap::new();
        extensions.insert("slack".to_string(), serde_json::Value::Object(fields));
        InterceptorResponse::allow_with_extensions(extensions)
    }
}

/// Pick `requested` fields out of a form body, first value wins.
fn decode_fields(body: &str, requested: &[String]) -> JsonMap {
    let mut fields = JsonMap::new();
    for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
        if fields.contains_key(key.as_ref()) || !requested.iter().any(|r| r == key.as_ref()) {
            continue;
        }
        fields.insert(key.into_owned(), form_value(&value));
    }
    fields
}

fn form_value(raw: &str) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => json,
        _ => serde_json::Value::String(raw.to_string()),
    }
}

#[cfg(test)]
#[path = "slack_tests.rs"]
mod tests;
