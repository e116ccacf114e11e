//! Bitbucket webhook verifier.

use super::{
    signature::{verify_webhook, Provider, Scheme},
    Interceptor, InterceptorRequest, InterceptorResponse,
};
use crate::secrets::SecretResolver;
use async_trait::async_trait;
use tracing::instrument;

const BITBUCKET: Provider = Provider {
    name: "bitbucket",
    event_header: "X-Event-Key",
    signature_headers: &["X-Hub-Signature"],
    scheme: Scheme::PrefixedHmac,
};

/// Validates Bitbucket deliveries (`X-Event-Key`, HMAC `X-Hub-Signature`).
#[derive(Clone)]
pub struct BitbucketInterceptor {
    resolver: SecretResolver,
}

impl BitbucketInterceptor {
    pub fn new(resolver: SecretResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Interceptor for BitbucketInterceptor {
    #[instrument(skip(self, request), fields(event_id = %request.context.event_id))]
    async fn process(&self, request: &InterceptorRequest) -> InterceptorResponse {
        verify_webhook(&BITBUCKET, &self.resolver, request).await
    }
}

#[cfg(test)]
#[path = "bitbucket_tests.rs"]
mod tests;
