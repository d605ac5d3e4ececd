//! Core types, configuration, and the metrics capability for blockswap.
//!
//! This crate provides the building blocks shared by the protocol engine and
//! the storage backend: environment-driven configuration helpers, the core
//! error type, and the [`Metrics`] sink that every component receives at
//! construction time instead of reaching for a process-wide global.

mod config;
mod error;
pub mod metrics;

pub use config::{PeerConfig, env_bool, env_parse, env_string};
pub use error::{BlockswapError, BlockswapResult};
pub use metrics::{Metrics, NoopMetrics, PrometheusMetrics, RecordingMetrics};
