//! GitHub webhook verifier.
//!
//! Checks `X-GitHub-Event` against the allowed event types and verifies the
//! HMAC signature in `X-Hub-Signature-256`, falling back to the legacy SHA-1
//! `X-Hub-Signature` header.

use super::{
    signature::{verify_webhook, Provider, Scheme},
    Interceptor, InterceptorRequest, InterceptorResponse,
};
use crate::secrets::SecretResolver;
use async_trait::async_trait;
use tracing::instrument;

const GITHUB: Provider = Provider {
    name: "github",
    event_header: "X-GitHub-Event",
    signature_headers: &["X-Hub-Signature-256", "X-Hub-Signature"],
    scheme: Scheme::PrefixedHmac,
};

/// Validates GitHub deliveries.
#[derive(Clone)]
pub struct GitHubInterceptor {
    resolver: SecretResolver,
}

impl GitHubInterceptor {
    pub fn new(resolver: SecretResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Interceptor for GitHubInterceptor {
    #[instrument(skip(self, request), fields(event_id = %request.context.event_id))]
    async fn process(&self, request: &InterceptorRequest) -> InterceptorResponse {
        verify_webhook(&GITHUB, &self.resolver, request).await
    }
}

#[cfg(test)]
#[path = "github_tests.rs"]
mod tests;
