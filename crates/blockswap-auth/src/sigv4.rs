//! AWS Signature Version 4 signing.
//!
//! 1. Add `host`, `x-amz-date`, `x-amz-content-sha256` and, for temporary
//!    credentials, `x-amz-security-token` to the caller's headers.
//! 2. Build the canonical request over all of them.
//! 3. Build the string to sign from the timestamp, credential scope, and
//!    canonical request hash.
//! 4. Derive the signing key with the HMAC-SHA256 chain and sign.
//!
//! The main entry point is [`sign_request`].

use chrono::{DateTime, Utc};
use hmac::{Hmac, KeyInit, Mac};
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::canonical::build_canonical_request;
use crate::credentials::Credentials;
use crate::error::AuthError;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Payload hash placeholder used when the request carries no body.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

type HmacSha256 = Hmac<Sha256>;

/// Description of a request to be signed.
#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    /// AWS region of the target endpoint.
    pub region: &'a str,
    /// Service name in the credential scope (`s3`, `dynamodb`, ...).
    pub service: &'a str,
    /// HTTP method.
    pub method: &'a str,
    /// Absolute request URL.
    pub url: &'a str,
    /// Extra headers to send and sign.
    pub headers: &'a [(&'a str, &'a str)],
    /// Request body. `None` signs with [`UNSIGNED_PAYLOAD`].
    pub payload: Option<&'a [u8]>,
}

/// The headers that authenticate a request, in lowercase-name order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    headers: Vec<(String, String)>,
}

impl SignedRequest {
    /// All headers, extra headers included.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Look up a header by lowercase name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Convert into an [`http::HeaderMap`] ready to attach to a request.
    ///
    /// `host` is left out; HTTP clients derive it from the URL.
    pub fn to_header_map(&self) -> Result<http::HeaderMap, AuthError> {
        let mut map = http::HeaderMap::with_capacity(self.headers.len());
        for (name, value) in self.headers.iter().filter(|(n, _)| n != "host") {
            let name = http::HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| AuthError::InvalidHeader(name.clone()))?;
            let value = http::HeaderValue::from_str(value)
                .map_err(|_| AuthError::InvalidHeader(name.to_string()))?;
            map.append(name, value);
        }
        Ok(map)
    }
}

/// Sign a request, returning the full header set to send.
///
/// # Errors
///
/// Returns [`AuthError::InvalidUrl`] if the URL cannot be parsed or has no
/// host.
pub fn sign_request(
    request: &SigningRequest<'_>,
    credentials: &Credentials,
    timestamp: DateTime<Utc>,
) -> Result<SignedRequest, AuthError> {
    let uri: http::Uri = request
        .url
        .parse()
        .map_err(|_| AuthError::InvalidUrl(request.url.to_owned()))?;
    let host = uri
        .authority()
        .map(|a| a.as_str().rsplit('@').next().unwrap_or_default().to_owned())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AuthError::InvalidUrl(request.url.to_owned()))?;

    let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date = timestamp.format("%Y%m%d").to_string();
    let payload_hash = request
        .payload
        .map_or_else(|| UNSIGNED_PAYLOAD.to_owned(), hash_payload);

    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(n, v)| (n.to_ascii_lowercase(), (*v).to_owned()))
        .collect();
    headers.push(("host".to_owned(), host));
    headers.push(("x-amz-date".to_owned(), amz_date.clone()));
    headers.push(("x-amz-content-sha256".to_owned(), payload_hash.clone()));
    if let Some(token) = &credentials.session_token {
        headers.push(("x-amz-security-token".to_owned(), token.clone()));
    }
    headers.sort();

    let header_refs: Vec<(&str, &str)> = headers
        .iter()
        .map(|(n, v)| (n.as_str(), v.as_str()))
        .collect();
    let canonical = build_canonical_request(
        request.method,
        uri.path(),
        uri.query().unwrap_or(""),
        &header_refs,
        &payload_hash,
    );
    trace!(canonical_request = %canonical.text, "built canonical request");

    let credential_scope = format!(
        "{date}/{}/{}/aws4_request",
        request.region, request.service
    );
    let string_to_sign = build_string_to_sign(
        &amz_date,
        &credential_scope,
        &hex::encode(Sha256::digest(canonical.text.as_bytes())),
    );

    let signing_key = derive_signing_key(
        &credentials.secret_access_key,
        &date,
        request.region,
        request.service,
    );
    let signature = compute_signature(&signing_key, &string_to_sign);

    headers.push((
        "authorization".to_owned(),
        format!(
            "{ALGORITHM} Credential={}/{credential_scope},SignedHeaders={},Signature={signature}",
            credentials.access_key_id, canonical.signed_headers
        ),
    ));
    headers.sort();

    Ok(SignedRequest { headers })
}

/// Build the SigV4 string to sign.
///
/// ```text
/// AWS4-HMAC-SHA256\n
/// <ISO8601 timestamp>\n
/// <credential_scope>\n
/// <hex(SHA256(canonical_request))>
/// ```
#[must_use]
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request_hash: &str,
) -> String {
    format!("{ALGORITHM}\n{timestamp}\n{credential_scope}\n{canonical_request_hash}")
}

/// Derive the SigV4 signing key.
///
/// ```text
/// DateKey              = HMAC-SHA256("AWS4" + secret_key, date)
/// DateRegionKey        = HMAC-SHA256(DateKey, region)
/// DateRegionServiceKey = HMAC-SHA256(DateRegionKey, service)
/// SigningKey           = HMAC-SHA256(DateRegionServiceKey, "aws4_request")
/// ```
#[must_use]
pub fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let date_key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let date_region_key = hmac_sha256(&date_key, region.as_bytes());
    let date_region_service_key = hmac_sha256(&date_region_key, service.as_bytes());
    hmac_sha256(&date_region_service_key, b"aws4_request")
}

/// Hex-encoded HMAC-SHA256 of `data` under `signing_key`.
#[must_use]
pub fn compute_signature(signing_key: &[u8], data: &str) -> String {
    hex::encode(hmac_sha256(signing_key, data.as_bytes()))
}

/// Hex-encoded SHA-256 of a payload, the `x-amz-content-sha256` value.
///
/// # Examples
///
/// ```
/// use blockswap_auth::hash_payload;
///
/// assert_eq!(
///     hash_payload(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[must_use]
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can accept keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
