//! HTTP header helpers.
//!
//! Webhook envelopes carry headers as a case-preserving multi-valued map.
//! Lookups go through [`canonical_header_key`] so that `x-github-event`,
//! `X-GitHub-Event` and `X-Github-Event` all resolve to the same entry.

use std::collections::HashMap;

/// Multi-valued, case-preserving header map as carried in an interceptor request.
pub type HeaderMap = HashMap<String, Vec<String>>;

/// Canonicalize a header name using the standard MIME header rules.
///
/// The first letter and any letter following a hyphen are upper-cased; all
/// other letters are lower-cased. Names containing characters that are not
/// valid in a header token are returned unchanged.
///
/// # Examples
///
/// ```rust
/// use trigger_gate_core::headers::canonical_header_key;
///
/// assert_eq!(canonical_header_key("x-github-event"), "X-Github-Event");
/// assert_eq!(canonical_header_key("CONTENT-TYPE"), "Content-Type");
/// ```
pub fn canonical_header_key(key: &str) -> String {
    if !key.bytes().all(is_token_byte) {
        return key.to_string();
    }

    let mut upper = true;
    key.chars()
        .map(|c| {
            let mapped = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            mapped
        })
        .collect()
}

/// Return all values of the header whose canonical name matches `key`.
///
/// An exact match on the canonical spelling wins; otherwise the first entry
/// whose canonical form matches is used.
pub fn header_values<'a>(headers: &'a HeaderMap, key: &str) -> Option<&'a [String]> {
    let canonical = canonical_header_key(key);
    if let Some(values) = headers.get(&canonical) {
        return Some(values.as_slice());
    }

    headers
        .iter()
        .find(|(name, _)| canonical_header_key(name) == canonical)
        .map(|(_, values)| values.as_slice())
}

/// Return the first value of the header whose canonical name matches `key`.
pub fn first_header_value<'a>(headers: &'a HeaderMap, key: &str) -> Option<&'a str> {
    header_values(headers, key)
        .and_then(|values| values.first())
        .map(String::as_str)
}

/// Media type of a `Content-Type` value without its parameters.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

#[cfg(test)]
#[path = "headers_tests.rs"]
mod tests;
