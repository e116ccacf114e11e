//! # Interceptors
//!
//! The request/response envelope exchanged with interceptors, the
//! [`Interceptor`] trait and the built-in implementations.
//!
//! Every interceptor answers with an [`InterceptorResponse`]. Rejections are
//! reported in-band through a [`Status`]; an interceptor never fails the HTTP
//! exchange itself.

use crate::{headers::HeaderMap, secrets::SecretResolver, Status, StatusCode};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use std::sync::Arc;

pub mod bitbucket;
pub mod cel;
pub mod chain;
pub mod github;
pub mod gitlab;
pub mod signature;
pub mod slack;

#[cfg(test)]
pub(crate) mod test_support;

pub use bitbucket::BitbucketInterceptor;
pub use cel::CelInterceptor;
pub use github::GitHubInterceptor;
pub use gitlab::GitLabInterceptor;
pub use slack::SlackInterceptor;

/// JSON object type used for parameters and extensions.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Envelope
// ============================================================================

/// Correlation metadata attached to every interceptor call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerContext {
    /// URL the event was delivered to.
    #[serde(default, rename = "eventURL", alias = "event_url")]
    pub event_url: String,

    /// Opaque event identifier used for correlation.
    #[serde(default, rename = "eventID", alias = "event_id")]
    pub event_id: String,

    /// Trigger identifier of the form `namespaces/<ns>/triggers/<name>`.
    #[serde(default, rename = "triggerID", alias = "trigger_id")]
    pub trigger_id: String,
}

impl TriggerContext {
    /// Create a context for `trigger_id`.
    pub fn new(
        event_url: impl Into<String>,
        event_id: impl Into<String>,
        trigger_id: impl Into<String>,
    ) -> Self {
        Self {
            event_url: event_url.into(),
            event_id: event_id.into(),
            trigger_id: trigger_id.into(),
        }
    }

    /// Namespace parsed from the trigger ID.
    ///
    /// Returns `None` unless the trigger ID has exactly four `/` separated
    /// segments and the namespace segment is not empty.
    pub fn namespace(&self) -> Option<&str> {
        self.trigger_segments()
            .map(|(namespace, _)| namespace)
            .filter(|ns| !ns.is_empty())
    }

    /// Trigger name parsed from the trigger ID.
    pub fn trigger_name(&self) -> Option<&str> {
        self.trigger_segments()
            .map(|(_, name)| name)
            .filter(|name| !name.is_empty())
    }

    fn trigger_segments(&self) -> Option<(&str, &str)> {
        let segments: Vec<&str> = self.trigger_id.split('/').collect();
        match segments.as_slice() {
            [_, namespace, _, name] => Some((namespace, name)),
            _ => None,
        }
    }
}

/// Request envelope handed to an interceptor. Immutable for the call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterceptorRequest {
    /// Raw request body, possibly empty.
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,

    /// Request headers; names are compared case-insensitively by the helpers
    /// in [`crate::headers`].
    #[serde(default, deserialize_with = "null_as_default")]
    pub header: HeaderMap,

    /// Interceptor specific parameters, validated by the interceptor.
    #[serde(
        default,
        rename = "interceptorParams",
        alias = "interceptor_params",
        deserialize_with = "null_as_default"
    )]
    pub interceptor_params: JsonMap,

    /// Extension fields written by earlier interceptors in the chain.
    #[serde(default, deserialize_with = "null_as_default")]
    pub extensions: JsonMap,

    /// Trigger correlation metadata.
    #[serde(default, deserialize_with = "null_as_default")]
    pub context: TriggerContext,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Response envelope returned by an interceptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptorResponse {
    /// True admits the event to the next stage.
    #[serde(rename = "continue")]
    pub continue_processing: bool,

    /// Why the event was rejected. Present when `continue` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    /// Fields to merge into the event for later stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<JsonMap>,
}

impl InterceptorResponse {
    /// Admit the event without extensions.
    pub fn allow() -> Self {
        Self {
            continue_processing: true,
            status: None,
            extensions: None,
        }
    }

    /// Admit the event with `extensions`; an empty map is omitted.
    pub fn allow_with_extensions(extensions: JsonMap) -> Self {
        Self {
            continue_processing: true,
            status: None,
            extensions: (!extensions.is_empty()).then_some(extensions),
        }
    }

    /// Reject the event.
    pub fn fail(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            continue_processing: false,
            status: Some(Status::new(code, message)),
            extensions: None,
        }
    }
}

// ============================================================================
// Interface Traits
// ============================================================================

/// A request validating or transforming unit invoked by name.
///
/// Implementations hold no per-call mutable state and may be invoked
/// concurrently without limit.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Decide whether the event continues and which extensions it carries.
    async fn process(&self, request: &InterceptorRequest) -> InterceptorResponse;
}

// ============================================================================
// Parameters
// ============================================================================

/// Error raised when interceptor parameters do not match the expected shape.
#[derive(Debug, thiserror::Error)]
#[error("failed to parse interceptor params: {source}")]
pub struct ParamsError {
    #[from]
    source: serde_json::Error,
}

/// Decode interceptor parameters into `T`.
///
/// # Errors
///
/// Returns [`ParamsError`] when the parameters do not deserialize into `T`.
pub fn parse_params<T: DeserializeOwned>(params: &JsonMap) -> Result<T, ParamsError> {
    Ok(serde_json::from_value(serde_json::Value::Object(params.clone()))?)
}

/// Names of the built-in interceptors.
pub const BUILTIN_INTERCEPTORS: &[&str] = &["cel", "github", "gitlab", "bitbucket", "slack"];

/// Construct the built-in interceptor called `name`.
pub fn builtin_interceptor(name: &str, resolver: SecretResolver) -> Option<Arc<dyn Interceptor>> {
    let interceptor: Arc<dyn Interceptor> = match name {
        "cel" => Arc::new(CelInterceptor::new(resolver)),
        "github" => Arc::new(GitHubInterceptor::new(resolver)),
        "gitlab" => Arc::new(GitLabInterceptor::new(resolver)),
        "bitbucket" => Arc::new(BitbucketInterceptor::new(resolver)),
        "slack" => Arc::new(SlackInterceptor::new(resolver)),
        _ => return None,
    };
    Some(interceptor)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
