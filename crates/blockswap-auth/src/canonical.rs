//! Canonical request construction for AWS Signature Version 4.
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! On the signing side every header handed to the signer is signed, so the
//! header list doubles as the signed-header list.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Everything except RFC 3986 unreserved characters is percent-encoded.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A canonical request together with the `SignedHeaders` list it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    /// The newline-separated canonical request text.
    pub text: String,
    /// Semicolon-separated, sorted, lowercase header names.
    pub signed_headers: String,
}

/// Build the canonical request for the given request parts.
///
/// # Examples
///
/// ```
/// use blockswap_auth::canonical::build_canonical_request;
///
/// let canonical = build_canonical_request(
///     "GET",
///     "/test.txt",
///     "",
///     &[("host", "examplebucket.s3.amazonaws.com")],
///     "UNSIGNED-PAYLOAD",
/// );
/// assert!(canonical.text.starts_with("GET\n/test.txt\n"));
/// assert_eq!(canonical.signed_headers, "host");
/// ```
#[must_use]
pub fn build_canonical_request(
    method: &str,
    path: &str,
    query: &str,
    headers: &[(&str, &str)],
    payload_hash: &str,
) -> CanonicalRequest {
    let header_map = normalize_headers(headers);

    let canonical_headers = header_map
        .iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join("\n");
    let signed_headers = header_map.keys().cloned().collect::<Vec<_>>().join(";");

    let text = format!(
        "{method}\n{}\n{}\n{canonical_headers}\n\n{signed_headers}\n{payload_hash}",
        build_canonical_uri(path),
        build_canonical_query_string(query),
    );

    CanonicalRequest {
        text,
        signed_headers,
    }
}

/// Percent-encode each path segment, keeping `/` separators.
///
/// Segments are decoded before encoding so an already-encoded path is not
/// encoded twice. An empty path is `/`.
///
/// # Examples
///
/// ```
/// use blockswap_auth::canonical::build_canonical_uri;
///
/// assert_eq!(build_canonical_uri(""), "/");
/// assert_eq!(build_canonical_uri("/car/a b.car"), "/car/a%20b.car");
/// ```
#[must_use]
pub fn build_canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_owned();
    }

    path.split('/')
        .map(|segment| {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            utf8_percent_encode(&decoded, URI_ENCODE_SET).to_string()
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Sort query parameters by name, then value. Values are kept as written.
///
/// # Examples
///
/// ```
/// use blockswap_auth::canonical::build_canonical_query_string;
///
/// assert_eq!(build_canonical_query_string("b=2&a=1"), "a=1&b=2");
/// ```
#[must_use]
pub fn build_canonical_query_string(query: &str) -> String {
    let mut params: Vec<(&str, &str)> = query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|param| param.split_once('=').unwrap_or((param, "")))
        .collect();

    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lowercase names, trim and collapse values, join duplicates with commas.
fn normalize_headers(headers: &[(&str, &str)]) -> BTreeMap<String, String> {
    let mut header_map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = collapse_whitespace(value.trim());
        header_map
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    header_map
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
            }
            prev_was_space = true;
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}
