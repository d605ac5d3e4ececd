//! Wantlist processing engine for blockswap.
//!
//! [`WantlistProcessor`] serves one wantlist per [`Connection`]: it splits
//! the entries into batches, applies cancellations, fetches through a
//! [`blockswap_backend::BlockSource`] with bounded concurrency and streams
//! size-bounded responses back. [`server`] puts it behind a TCP listener
//! with varint-framed streams.

mod config;
mod connection;
mod context;
mod error;
mod framed;
mod processor;
pub mod server;

#[cfg(test)]
mod test_support;

pub use config::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PROCESSING_CONCURRENCY, ProcessorConfig,
};
pub use connection::{Connection, MemoryConnection};
pub use context::{ProcessingContext, RequestState};
pub use error::TransportError;
pub use framed::{FramedConnection, VarintFrameCodec};
pub use processor::WantlistProcessor;
