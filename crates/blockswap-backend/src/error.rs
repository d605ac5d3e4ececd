//! Backend error types.

use blockswap_auth::AuthError;

/// Errors raised by metadata and blob store calls.
///
/// A missing record is not an error; lookups return `Ok(None)` for it.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The request could not be sent or its body not read.
    #[error("{service} transport error: {source}")]
    Transport {
        /// `dynamodb` or `s3`.
        service: &'static str,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The store answered with a failure status.
    #[error("{service} returned HTTP {status}: {message}")]
    Status {
        /// `dynamodb` or `s3`.
        service: &'static str,
        /// HTTP status code.
        status: u16,
        /// Error code and message from the body, if any.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("{service} response could not be decoded: {reason}")]
    Decode {
        /// `dynamodb`, `s3` or `sts`.
        service: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// The request could not be signed.
    #[error("signing failed: {0}")]
    Signing(#[from] AuthError),

    /// The HTTP client could not be built.
    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// Errors raised while obtaining temporary credentials.
///
/// Any of these during rotation is fatal to the backend client.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// No usable credential source is configured.
    #[error("missing credentials: {0}")]
    Missing(String),

    /// The identity token file could not be read.
    #[error("failed to read web identity token {path}: {source}")]
    TokenFile {
        /// Token file path.
        path: String,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The exchange request failed in transport.
    #[error("credential exchange failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The token service rejected the exchange.
    #[error("credential exchange returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The exchange response did not contain credentials.
    #[error("credential exchange response could not be decoded: {0}")]
    Decode(String),
}
