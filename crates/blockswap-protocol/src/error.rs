//! Codec error types.

/// Errors raised while decoding or interpreting wire data.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The bytes are not a valid protobuf message.
    #[error("invalid wire format: {0}")]
    InvalidWireFormat(#[from] prost::DecodeError),

    /// A CID could not be parsed or converted.
    #[error("invalid CID: {0}")]
    InvalidCid(String),

    /// A block prefix is truncated or names an unsupported hash.
    #[error("invalid block prefix: {0}")]
    InvalidPrefix(String),

    /// The protocol identifier is not one this peer speaks.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),
}
