//! Latency aggregation and its Prometheus exposition.

mod aggregator;
mod collector;
mod histogram;

pub use aggregator::{MetricsAggregator, SeriesSnapshot};
pub use collector::{
    IopingCollector, PROBE_FAILURES_TOTAL, REQUESTS_TOTAL, RESPONSE_DURATION_SECONDS,
};
pub use histogram::{BucketSnapshot, HistogramSnapshot, LatencyHistogram};
