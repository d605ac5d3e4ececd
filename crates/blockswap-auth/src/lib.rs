//! AWS Signature Version 4 request signing for blockswap.
//!
//! This crate is the client half of SigV4: given a request description and a
//! credential snapshot it produces the headers that authenticate the call.
//! Signing is a pure function of its inputs (the timestamp included), so the
//! same request signed twice yields byte-identical headers.
//!
//! # Usage
//!
//! ```rust
//! use blockswap_auth::{Credentials, SigningRequest, sign_request};
//! use chrono::{TimeZone, Utc};
//!
//! let credentials = Credentials::new("AKIDEXAMPLE", "secret", None);
//! let request = SigningRequest {
//!     region: "us-west-2",
//!     service: "dynamodb",
//!     method: "POST",
//!     url: "https://dynamodb.us-west-2.amazonaws.com/",
//!     headers: &[("x-amz-target", "DynamoDB_20120810.GetItem")],
//!     payload: Some(b"{}"),
//! };
//! let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let signed = sign_request(&request, &credentials, timestamp).unwrap();
//! assert!(signed.header("authorization").unwrap().starts_with("AWS4-HMAC-SHA256"));
//! ```
//!
//! # Modules
//!
//! - [`canonical`] - Canonical request construction for AWS SigV4
//! - [`credentials`] - Credential value type and provider trait
//! - [`error`] - Signing error types
//! - [`sigv4`] - Signing-key derivation and header generation

pub mod canonical;
pub mod credentials;
pub mod error;
pub mod sigv4;

pub use credentials::{CredentialProvider, Credentials, StaticCredentialProvider};
pub use error::AuthError;
pub use sigv4::{SignedRequest, SigningRequest, UNSIGNED_PAYLOAD, hash_payload, sign_request};
