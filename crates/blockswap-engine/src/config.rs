//! Wantlist processing configuration.

use blockswap_core::env_parse;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Default upper bound on one encoded message, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;
/// Default number of entries per batch.
pub const DEFAULT_BATCH_SIZE: usize = 32;
/// Default number of batches fetched at the same time, process-wide.
pub const DEFAULT_PROCESSING_CONCURRENCY: usize = 32;

/// Tunables for [`crate::WantlistProcessor`].
///
/// # Examples
///
/// ```
/// use blockswap_engine::ProcessorConfig;
///
/// let config = ProcessorConfig::builder().batch_size(4).build();
/// assert_eq!(config.batch_size, 4);
/// assert_eq!(config.max_message_size, 4 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorConfig {
    /// Encoded size limit for outgoing and incoming messages.
    #[builder(default = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,

    /// Entries per batch.
    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Batches fetching at once across all connections.
    #[builder(default = DEFAULT_PROCESSING_CONCURRENCY)]
    pub processing_concurrency: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ProcessorConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `MAX_MESSAGE_SIZE` | `4194304` |
    /// | `BLOCKS_BATCH_SIZE` | `32` |
    /// | `PROCESSING_CONCURRENCY` | `32` |
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_message_size: env_parse("MAX_MESSAGE_SIZE", DEFAULT_MAX_MESSAGE_SIZE),
            batch_size: env_parse("BLOCKS_BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1),
            processing_concurrency: env_parse(
                "PROCESSING_CONCURRENCY",
                DEFAULT_PROCESSING_CONCURRENCY,
            )
            .max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_use_documented_defaults() {
        let config = ProcessorConfig::default();
        assert_eq!(config.max_message_size, 4_194_304);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.processing_concurrency, 32);
    }
}
