//! Error types for SigV4 request signing.

/// Errors that can occur while signing a backend request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request URL could not be parsed or has no host.
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    /// A header name or value cannot be carried in an HTTP request.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}
