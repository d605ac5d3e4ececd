//! Error types for the blockswap core.

/// Core error type for blockswap infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum BlockswapError {
    /// A metric could not be registered with the exporter registry.
    #[error("metrics registration failed for {name}: {reason}")]
    Metrics {
        /// Metric name as emitted by the components.
        name: String,
        /// Underlying registry failure.
        reason: String,
    },
}

/// Convenience result type for blockswap core operations.
pub type BlockswapResult<T> = Result<T, BlockswapError>;
