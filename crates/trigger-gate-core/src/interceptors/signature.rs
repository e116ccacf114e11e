//! Webhook signature verification shared by the provider verifiers.
//!
//! GitHub and Bitbucket sign the raw body with HMAC and send
//! `<algorithm>=<hex digest>`; GitLab echoes a shared token. Both checks are
//! constant-time.

use super::{parse_params, InterceptorRequest, InterceptorResponse};
use crate::{
    headers::first_header_value,
    secrets::{SecretError, SecretRef, SecretResolver, SecretValue},
    StatusCode,
};
use hmac::{digest::KeyInit, Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use tracing::debug;

// ============================================================================
// HMAC
// ============================================================================

/// Digest algorithms accepted in a prefixed signature header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmacAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl HmacAlgorithm {
    /// Parse the prefix of a `<algorithm>=<hex>` signature.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Prefix used in signature headers.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Compute the `<algorithm>=<hex>` signature of `payload`.
    pub fn sign(&self, secret: &[u8], payload: &[u8]) -> Result<String, SignatureError> {
        let digest = match self {
            Self::Sha1 => compute::<Hmac<Sha1>>(secret, payload)?,
            Self::Sha256 => compute::<Hmac<Sha256>>(secret, payload)?,
            Self::Sha512 => compute::<Hmac<Sha512>>(secret, payload)?,
        };
        Ok(format!("{}={}", self.prefix(), hex::encode(digest)))
    }

    fn verify(&self, secret: &[u8], payload: &[u8], expected: &[u8]) -> Result<(), SignatureError> {
        match self {
            Self::Sha1 => verify_mac::<Hmac<Sha1>>(secret, payload, expected),
            Self::Sha256 => verify_mac::<Hmac<Sha256>>(secret, payload, expected),
            Self::Sha512 => verify_mac::<Hmac<Sha512>>(secret, payload, expected),
        }
    }
}

/// Reasons a signature check fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature is not of the form <algorithm>=<hex>")]
    Malformed,

    #[error("unsupported signature algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("signature is not valid hex")]
    InvalidHex,

    #[error("invalid HMAC key")]
    InvalidKey,

    #[error("signature does not match")]
    Mismatch,
}

fn compute<M: Mac + KeyInit>(secret: &[u8], payload: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let mut mac = <M as Mac>::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn verify_mac<M: Mac + KeyInit>(
    secret: &[u8],
    payload: &[u8],
    expected: &[u8],
) -> Result<(), SignatureError> {
    let mut mac = <M as Mac>::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(payload);
    mac.verify_slice(expected).map_err(|_| SignatureError::Mismatch)
}

/// Verify a `<algorithm>=<hex>` signature over `payload`.
///
/// # Errors
///
/// Returns [`SignatureError`] when the header is malformed, names an
/// unsupported algorithm or does not match.
pub fn verify_prefixed_hmac(
    secret: &[u8],
    payload: &[u8],
    signature: &str,
) -> Result<(), SignatureError> {
    let (prefix, hex_sig) = signature.split_once('=').ok_or(SignatureError::Malformed)?;
    let algorithm = HmacAlgorithm::from_prefix(prefix)
        .ok_or_else(|| SignatureError::UnsupportedAlgorithm(prefix.to_string()))?;
    let sig_bytes = hex::decode(hex_sig).map_err(|_| SignatureError::InvalidHex)?;

    algorithm.verify(secret, payload, &sig_bytes)
}

/// Constant-time comparison of a shared token against the secret.
pub fn verify_token(secret: &SecretValue, token: &str) -> Result<(), SignatureError> {
    if secret.matches(token.as_bytes()) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

// ============================================================================
// Shared verifier flow
// ============================================================================

/// How a provider authenticates its deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scheme {
    PrefixedHmac,
    Token,
}

/// Header names and scheme of a webhook provider.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Provider {
    pub name: &'static str,
    pub event_header: &'static str,
    /// Checked in order; the first non-empty value is used.
    pub signature_headers: &'static [&'static str],
    pub scheme: Scheme,
}

/// Parameters shared by the provider verifiers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VerifierParams {
    #[serde(default)]
    pub secret_ref: Option<SecretRef>,

    #[serde(default)]
    pub event_types: Option<Vec<String>>,
}

/// Status code reported for a secret resolution failure.
pub(crate) fn secret_error_status(error: &SecretError) -> StatusCode {
    if error.is_not_found() {
        StatusCode::NotFound
    } else {
        StatusCode::Internal
    }
}

/// Resolve `secret_ref`, rejecting an empty key before any cache access.
pub(crate) async fn resolve_secret(
    resolver: &SecretResolver,
    secret_ref: &SecretRef,
    request: &InterceptorRequest,
) -> Result<SecretValue, InterceptorResponse> {
    if secret_ref.secret_key.is_empty() {
        return Err(InterceptorResponse::fail(
            StatusCode::FailedPrecondition,
            "secretRef.secretKey must not be empty",
        ));
    }

    resolver
        .resolve(secret_ref, request.context.namespace())
        .await
        .map_err(|e| {
            InterceptorResponse::fail(secret_error_status(&e), format!("error getting secret: {e}"))
        })
}

/// Run the event type and signature checks of `provider` on `request`.
pub(crate) async fn verify_webhook(
    provider: &Provider,
    resolver: &SecretResolver,
    request: &InterceptorRequest,
) -> InterceptorResponse {
    let params: VerifierParams = match parse_params(&request.interceptor_params) {
        Ok(params) => params,
        Err(e) => return InterceptorResponse::fail(StatusCode::InvalidArgument, e.to_string()),
    };

    if let Some(allowed) = params.event_types.as_ref().filter(|types| !types.is_empty()) {
        let event_type = first_header_value(&request.header, provider.event_header);
        if !event_type.is_some_and(|actual| allowed.iter().any(|t| t == actual)) {
            let message = match event_type {
                Some(actual) => format!("event type {actual} is not allowed"),
                None => format!("event type header {} is not set", provider.event_header),
            };
            debug!(provider = provider.name, %message, "Rejected webhook event type");
            return InterceptorResponse::fail(StatusCode::FailedPrecondition, message);
        }
    }

    let Some(secret_ref) = params.secret_ref else {
        return InterceptorResponse::allow();
    };

    let Some(signature) = provider
        .signature_headers
        .iter()
        .find_map(|name| first_header_value(&request.header, name).filter(|v| !v.is_empty()))
    else {
        let header = provider.signature_headers.first().copied().unwrap_or_default();
        return InterceptorResponse::fail(
            StatusCode::InvalidArgument,
            format!("no {header} header set"),
        );
    };

    let secret = match resolve_secret(resolver, &secret_ref, request).await {
        Ok(secret) => secret,
        Err(response) => return response,
    };

    let verified = match provider.scheme {
        Scheme::PrefixedHmac => {
            verify_prefixed_hmac(secret.expose_bytes(), request.body.as_bytes(), signature)
        }
        Scheme::Token => verify_token(&secret, signature),
    };

    match verified {
        Ok(()) => InterceptorResponse::allow(),
        Err(e) => {
            debug!(provider = provider.name, error = %e, "Webhook signature rejected");
            InterceptorResponse::fail(
                StatusCode::FailedPrecondition,
                format!("{} signature check failed: {e}", provider.name),
            )
        }
    }
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
