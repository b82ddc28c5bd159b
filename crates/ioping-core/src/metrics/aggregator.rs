//! Latency aggregation per (target, mode) series.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use super::histogram::{HistogramSnapshot, LatencyHistogram};
use crate::config::{ConfigError, ProbeConfig, validate_buckets};
use crate::prober::parser::Statistics;
use crate::prober::target::{ProbeMode, SeriesKey};
use crate::prober::worker::MeasurementSink;

/// Nanoseconds to seconds.
const NANOS_TO_SECONDS: f64 = 1e-9;

/// Snapshot of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    pub key: SeriesKey,
    pub histogram: HistogramSnapshot,
}

/// Latency histograms keyed by (target, mode label).
///
/// Keys are created with [`register`](Self::register), which needs
/// exclusive access; once the aggregator is shared behind an `Arc` the key
/// set is frozen and workers can only record into existing series.
/// Every series has its own lock, held for a single increment or copy.
#[derive(Debug)]
pub struct MetricsAggregator {
    buckets: Vec<f64>,
    series: BTreeMap<SeriesKey, Mutex<LatencyHistogram>>,
}

impl MetricsAggregator {
    /// Empty aggregator with the given bucket bounds in seconds.
    pub fn new(buckets: Vec<f64>) -> Result<Self, ConfigError> {
        validate_buckets(&buckets)?;
        Ok(Self {
            buckets,
            series: BTreeMap::new(),
        })
    }

    /// Aggregator with a zero series for every probe in `config`.
    pub fn for_config(config: &ProbeConfig) -> Result<Self, ConfigError> {
        let mut aggregator = Self::new(config.buckets.clone())?;
        for target in config.probe_targets() {
            aggregator.register(&target.path, target.mode);
        }
        Ok(aggregator)
    }

    /// Ensures a zero series exists for the key. Idempotent.
    pub fn register(&mut self, target: &str, mode: ProbeMode) {
        let buckets = &self.buckets;
        self.series
            .entry(SeriesKey::new(target, mode))
            .or_insert_with(|| Mutex::new(LatencyHistogram::new(buckets.clone())));
    }

    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Records `latency_ns` as seconds into the key's histogram.
    ///
    /// Returns `false` if the key was never registered; nothing is recorded.
    pub fn observe_latency(&self, target: &str, mode: ProbeMode, latency_ns: u64) -> bool {
        match self.series.get(&SeriesKey::new(target, mode)) {
            Some(series) => {
                series
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .observe(latency_ns as f64 * NANOS_TO_SECONDS);
                true
            }
            None => false,
        }
    }

    /// Consistent copy of every series, ordered by key.
    pub fn snapshot(&self) -> Vec<SeriesSnapshot> {
        self.series
            .iter()
            .map(|(key, series)| SeriesSnapshot {
                key: key.clone(),
                histogram: series
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .snapshot(),
            })
            .collect()
    }
}

impl MeasurementSink for MetricsAggregator {
    fn observe(&self, stats: &Statistics) {
        if !self.observe_latency(&stats.target, stats.mode, stats.max_ns) {
            warn!(
                target = %stats.target,
                mode = stats.mode.label(),
                "measurement for unregistered series dropped"
            );
        }
    }
}
