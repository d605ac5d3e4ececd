//! Metadata and blob store client for blockswap.
//!
//! [`BackendClient`] resolves a storage key to a byte range with DynamoDB
//! `Query`/`GetItem` calls and reads that range from S3. Every call is signed
//! with SigV4, retried with a fixed delay, and optionally cached.
//! [`start_rotation`] keeps web identity credentials fresh in the
//! background.

pub mod cache;
mod client;
mod config;
pub mod credentials;
mod error;
pub mod retry;
mod source;
mod types;

#[cfg(test)]
mod test_support;

pub use client::{BackendClient, build_http_client};
pub use config::{BackendConfig, CredentialSource, WebIdentityConfig};
pub use credentials::{RotatingCredentialProvider, start_rotation};
pub use error::{BackendError, CredentialError};
pub use source::BlockSource;
pub use types::{BlobLocator, BlockInfo};
