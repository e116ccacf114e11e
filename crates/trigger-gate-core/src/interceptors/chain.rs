//! Ordered execution of an interceptor chain.

use super::{Interceptor, InterceptorRequest, JsonMap};
use crate::Status;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of running a chain of interceptors.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    /// True when every interceptor let the event continue.
    pub continue_processing: bool,

    /// Name of the interceptor that stopped the event.
    pub stopped_by: Option<String>,

    /// Rejection status reported by `stopped_by`.
    pub status: Option<Status>,

    /// Extensions accumulated up to the point the chain ended.
    pub extensions: JsonMap,
}

/// Run `chain` in order against `request`.
///
/// Each interceptor sees the extensions merged from every earlier response.
/// The first interceptor that does not continue ends the chain.
pub async fn run_chain(
    chain: &[(String, Arc<dyn Interceptor>)],
    request: &InterceptorRequest,
) -> ChainOutcome {
    let mut current = request.clone();

    for (name, interceptor) in chain {
        let response = interceptor.process(&current).await;
        if !response.continue_processing {
            info!(
                interceptor = %name,
                event_id = %request.context.event_id,
                status = ?response.status,
                "Interceptor stopped the event"
            );
            return ChainOutcome {
                continue_processing: false,
                stopped_by: Some(name.clone()),
                status: response.status,
                extensions: current.extensions,
            };
        }

        if let Some(extensions) = response.extensions {
            debug!(interceptor = %name, fields = extensions.len(), "Merging extensions");
            merge_extensions(&mut current.extensions, extensions);
        }
    }

    ChainOutcome {
        continue_processing: true,
        stopped_by: None,
        status: None,
        extensions: current.extensions,
    }
}

/// Deep merge `source` into `target`; nested objects merge, other values replace.
pub fn merge_extensions(target: &mut JsonMap, source: JsonMap) {
    for (key, value) in source {
        let serde_json::Value::Object(incoming) = value else {
            target.insert(key, value);
            continue;
        };
        if let Some(serde_json::Value::Object(existing)) = target.get_mut(&key) {
            merge_extensions(existing, incoming);
            continue;
        }
        target.insert(key, serde_json::Value::Object(incoming));
    }
}

#[cfg(test)]
#[path = "chain_tests.rs"]
mod tests;
