//! Transport error types.

/// Errors raised by a [`crate::Connection`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed by either side.
    #[error("connection closed")]
    Closed,

    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame announced more bytes than allowed.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Announced length.
        len: u64,
        /// Configured limit.
        max: usize,
    },

    /// The listener does not speak the requested protocol.
    #[error("protocol {0} not supported by peer")]
    ProtocolRejected(String),

    /// A frame header is malformed.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}
