//! Tests for HMAC and token verification.

use super::*;
use subtle::ConstantTimeEq;

const FOX: &[u8] = b"The quick brown fox jumps over the lazy dog";

#[test]
fn test_sign_known_vectors() {
    assert_eq!(
        HmacAlgorithm::Sha1.sign(b"key", FOX).unwrap(),
        "sha1=de7c9b85b8b78aa6bc8a7a36f70a90701c9db4d9"
    );
    assert_eq!(
        HmacAlgorithm::Sha256.sign(b"key", FOX).unwrap(),
        "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
    );
}

#[test]
fn test_verify_accepts_every_supported_algorithm() {
    for algorithm in [HmacAlgorithm::Sha1, HmacAlgorithm::Sha256, HmacAlgorithm::Sha512] {
        let signature = algorithm.sign(b"secret", b"{}").unwrap();
        assert_eq!(verify_prefixed_hmac(b"secret", b"{}", &signature), Ok(()), "{signature}");
    }
}

#[test]
fn test_verify_rejects_wrong_secret() {
    let signature = HmacAlgorithm::Sha256.sign(b"secret", b"{}").unwrap();

    assert_eq!(
        verify_prefixed_hmac(b"other", b"{}", &signature),
        Err(SignatureError::Mismatch)
    );
}

#[test]
fn test_verify_rejects_malformed_signatures() {
    assert_eq!(verify_prefixed_hmac(b"s", b"", "abcdef"), Err(SignatureError::Malformed));
    assert_eq!(
        verify_prefixed_hmac(b"s", b"", "md5=abcdef"),
        Err(SignatureError::UnsupportedAlgorithm("md5".to_string()))
    );
    assert_eq!(verify_prefixed_hmac(b"s", b"", "sha1=zz"), Err(SignatureError::InvalidHex));
    assert_eq!(verify_prefixed_hmac(b"s", b"", "sha1=abcd"), Err(SignatureError::Mismatch));
}

#[test]
fn test_verify_token() {
    let secret = SecretValue::from("token");

    assert_eq!(verify_token(&secret, "token"), Ok(()));
    assert_eq!(verify_token(&secret, "tokenx"), Err(SignatureError::Mismatch));
    assert_eq!(verify_token(&secret, ""), Err(SignatureError::Mismatch));
}

#[test]
fn test_verify_token_agrees_with_constant_time_eq() {
    let secret = SecretValue::from("gitlab-token");

    // Equal length mismatches at either end, shorter and longer tokens.
    for token in ["gitlab-token", "Gitlab-token", "gitlab-tokeN", "gitlab-toke", "gitlab-tokens"] {
        let expected: bool = b"gitlab-token".as_slice().ct_eq(token.as_bytes()).into();

        assert_eq!(verify_token(&secret, token).is_ok(), expected, "{token:?}");
    }
}

#[test]
fn test_secret_error_status() {
    let not_found = SecretError::NotFound {
        namespace: "ns".to_string(),
        name: "s".to_string(),
    };
    let invalid = SecretError::InvalidReference {
        message: "empty".to_string(),
    };

    assert_eq!(secret_error_status(&not_found), StatusCode::NotFound);
    assert_eq!(secret_error_status(&invalid), StatusCode::Internal);
}
