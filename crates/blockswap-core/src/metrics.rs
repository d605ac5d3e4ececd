//! Metrics capability injected into every component that emits events.
//!
//! Components never talk to an exporter directly. They hold an
//! `Arc<dyn Metrics>` and call [`Metrics::increase`], [`Metrics::decrease`]
//! or [`Metrics::record`] with one of the names in [`names`]. Tests pass
//! [`NoopMetrics`] or [`RecordingMetrics`]; the server passes
//! [`PrometheusMetrics`].

use std::collections::HashMap;
use std::fmt;

use dashmap::DashMap;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use tracing::debug;

use crate::error::{BlockswapError, BlockswapResult};

/// Metric names emitted by blockswap components.
pub mod names {
    /// Connections currently being served (gauge).
    pub const ACTIVE_CONNECTIONS: &str = "active-connections";
    /// Wantlist entries accepted but not yet finalized (gauge).
    pub const PENDING_ENTRIES: &str = "pending-entries";
    /// Wall-clock duration of a wantlist request in milliseconds (histogram).
    pub const REQUEST_DURATION: &str = "request-duration";
    /// Blocks written to a response message.
    pub const BLOCKS_SENT: &str = "blocks-sent";
    /// Presences written to a response message.
    pub const PRESENCES_SENT: &str = "presences-sent";
    /// Fetched results suppressed because the peer canceled them.
    pub const BLOCKS_CANCELED: &str = "blocks-canceled";
    /// Entries dropped because of a backend or classification error.
    pub const BLOCKS_ERROR: &str = "blocks-error";
    /// Inbound payloads that failed to decode.
    pub const INVALID_MESSAGES: &str = "invalid-messages";
    /// Encoded response messages written to a connection.
    pub const MESSAGES_SENT: &str = "messages-sent";
    /// Metadata store calls (including retries).
    pub const DYNAMO_REQUESTS: &str = "dynamo-requests";
    /// Failed metadata store calls.
    pub const DYNAMO_ERRORS: &str = "dynamo-errors";
    /// Blob store calls (including retries).
    pub const S3_REQUESTS: &str = "s3-requests";
    /// Failed blob store calls.
    pub const S3_ERRORS: &str = "s3-errors";
    /// Reads answered from an in-memory cache.
    pub const CACHE_HITS: &str = "cache-hits";
    /// Cache lookups that fell through to the backend.
    pub const CACHE_MISSES: &str = "cache-misses";
}

/// Sink for counter, gauge and histogram events.
pub trait Metrics: Send + Sync + fmt::Debug {
    /// Increment a counter or up/down gauge.
    fn increase(&self, name: &str, by: u64);

    /// Decrement an up/down gauge.
    fn decrease(&self, name: &str, by: u64);

    /// Record one histogram observation.
    fn record(&self, name: &str, value: f64);
}

/// Metrics sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn increase(&self, _name: &str, _by: u64) {}

    fn decrease(&self, _name: &str, _by: u64) {}

    fn record(&self, _name: &str, _value: f64) {}
}

/// In-memory metrics sink that remembers every event.
///
/// # Examples
///
/// ```
/// use blockswap_core::{Metrics, RecordingMetrics};
///
/// let metrics = RecordingMetrics::default();
/// metrics.increase("blocks-sent", 2);
/// metrics.decrease("blocks-sent", 1);
/// assert_eq!(metrics.value("blocks-sent"), 1);
/// ```
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    values: DashMap<String, i64>,
    observations: DashMap<String, Vec<f64>>,
}

impl RecordingMetrics {
    /// Current value of a counter or gauge (zero if never touched).
    #[must_use]
    pub fn value(&self, name: &str) -> i64 {
        self.values.get(name).map_or(0, |v| *v)
    }

    /// All observations recorded for a histogram.
    #[must_use]
    pub fn observations(&self, name: &str) -> Vec<f64> {
        self.observations
            .get(name)
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

impl Metrics for RecordingMetrics {
    fn increase(&self, name: &str, by: u64) {
        *self.values.entry(name.to_owned()).or_insert(0) += saturating_i64(by);
    }

    fn decrease(&self, name: &str, by: u64) {
        *self.values.entry(name.to_owned()).or_insert(0) -= saturating_i64(by);
    }

    fn record(&self, name: &str, value: f64) {
        self.observations
            .entry(name.to_owned())
            .or_default()
            .push(value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

const METRIC_TABLE: &[(&str, MetricKind, &str)] = &[
    (names::ACTIVE_CONNECTIONS, MetricKind::Gauge, "Connections being served"),
    (names::PENDING_ENTRIES, MetricKind::Gauge, "Wantlist entries in flight"),
    (names::REQUEST_DURATION, MetricKind::Histogram, "Wantlist request duration in milliseconds"),
    (names::BLOCKS_SENT, MetricKind::Counter, "Blocks sent to peers"),
    (names::PRESENCES_SENT, MetricKind::Counter, "Presences sent to peers"),
    (names::BLOCKS_CANCELED, MetricKind::Counter, "Fetched entries suppressed by cancellation"),
    (names::BLOCKS_ERROR, MetricKind::Counter, "Entries dropped because of errors"),
    (names::INVALID_MESSAGES, MetricKind::Counter, "Inbound messages that failed to decode"),
    (names::MESSAGES_SENT, MetricKind::Counter, "Response messages written"),
    (names::DYNAMO_REQUESTS, MetricKind::Counter, "Metadata store calls"),
    (names::DYNAMO_ERRORS, MetricKind::Counter, "Failed metadata store calls"),
    (names::S3_REQUESTS, MetricKind::Counter, "Blob store calls"),
    (names::S3_ERRORS, MetricKind::Counter, "Failed blob store calls"),
    (names::CACHE_HITS, MetricKind::Counter, "Cache hits"),
    (names::CACHE_MISSES, MetricKind::Counter, "Cache misses"),
];

/// Upper bounds for `request-duration`, which is recorded in milliseconds.
const DURATION_BUCKETS_MS: &[f64] = &[
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
];

/// Metrics sink backed by a Prometheus registry.
///
/// Every name in [`names`] is registered up front; hyphens become underscores
/// in the exported metric name. Events for unknown names are dropped.
pub struct PrometheusMetrics {
    registry: Registry,
    counters: HashMap<&'static str, IntCounter>,
    gauges: HashMap<&'static str, IntGauge>,
    histograms: HashMap<&'static str, Histogram>,
}

impl fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusMetrics")
            .field("counters", &self.counters.len())
            .field("gauges", &self.gauges.len())
            .field("histograms", &self.histograms.len())
            .finish_non_exhaustive()
    }
}

impl PrometheusMetrics {
    /// Create a registry with every known metric registered.
    pub fn new() -> BlockswapResult<Self> {
        let registry = Registry::new();
        let mut counters = HashMap::new();
        let mut gauges = HashMap::new();
        let mut histograms = HashMap::new();

        for &(name, kind, help) in METRIC_TABLE {
            let exported = exported_name(name);
            let to_error = |e: prometheus::Error| BlockswapError::Metrics {
                name: name.to_owned(),
                reason: e.to_string(),
            };
            match kind {
                MetricKind::Counter => {
                    let counter = IntCounter::new(exported, help).map_err(to_error)?;
                    registry
                        .register(Box::new(counter.clone()))
                        .map_err(to_error)?;
                    counters.insert(name, counter);
                }
                MetricKind::Gauge => {
                    let gauge = IntGauge::new(exported, help).map_err(to_error)?;
                    registry.register(Box::new(gauge.clone())).map_err(to_error)?;
                    gauges.insert(name, gauge);
                }
                MetricKind::Histogram => {
                    let opts =
                        HistogramOpts::new(exported, help).buckets(DURATION_BUCKETS_MS.to_vec());
                    let histogram = Histogram::with_opts(opts).map_err(to_error)?;
                    registry
                        .register(Box::new(histogram.clone()))
                        .map_err(to_error)?;
                    histograms.insert(name, histogram);
                }
            }
        }

        Ok(Self {
            registry,
            counters,
            gauges,
            histograms,
        })
    }

    /// Render the registry in the Prometheus text exposition format.
    #[must_use]
    pub fn gather_text(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            debug!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Metrics for PrometheusMetrics {
    fn increase(&self, name: &str, by: u64) {
        if let Some(counter) = self.counters.get(name) {
            counter.inc_by(by);
        } else if let Some(gauge) = self.gauges.get(name) {
            gauge.add(saturating_i64(by));
        } else {
            debug!(name, "increase on unknown metric");
        }
    }

    fn decrease(&self, name: &str, by: u64) {
        if let Some(gauge) = self.gauges.get(name) {
            gauge.sub(saturating_i64(by));
        } else {
            debug!(name, "decrease on unknown or monotonic metric");
        }
    }

    fn record(&self, name: &str, value: f64) {
        if let Some(histogram) = self.histograms.get(name) {
            histogram.observe(value);
        } else {
            debug!(name, "record on unknown metric");
        }
    }
}

fn exported_name(name: &str) -> String {
    name.replace('-', "_")
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
