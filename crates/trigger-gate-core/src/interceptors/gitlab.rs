//! GitLab webhook verifier.
//!
//! GitLab does not sign deliveries; it echoes the configured secret token in
//! `X-Gitlab-Token`, which is compared in constant time.

use super::{
    signature::{verify_webhook, Provider, Scheme},
    Interceptor, InterceptorRequest, InterceptorResponse,
};
use crate::secrets::SecretResolver;
use async_trait::async_trait;
use tracing::instrument;

const GITLAB: Provider = Provider {
    name: "gitlab",
    event_header: "X-Gitlab-Event",
    signature_headers: &["X-Gitlab-Token"],
    scheme: Scheme::Token,
};

/// Validates GitLab deliveries.
#[derive(Clone)]
pub struct GitLabInterceptor {
    resolver: SecretResolver,
}

impl GitLabInterceptor {
    pub fn new(resolver: SecretResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Interceptor for GitLabInterceptor {
    #[instrument(skip(self, request), fields(event_id = %request.context.event_id))]
    async fn process(&self, request: &InterceptorRequest) -> InterceptorResponse {
        verify_webhook(&GITLAB, &self.resolver, request).await
    }
}

#[cfg(test)]
#[path = "gitlab_tests.rs"]
mod tests;
