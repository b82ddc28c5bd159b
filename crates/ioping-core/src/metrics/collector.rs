//! Prometheus collector over the probe counters and the aggregator.

use std::collections::HashMap;
use std::sync::Arc;

use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, LabelPair, MetricFamily, MetricType};

use super::aggregator::MetricsAggregator;
use crate::prober::target::SeriesKey;
use crate::prober::worker::ProbeState;

pub const REQUESTS_TOTAL: &str = "ioping_requests_total";
pub const PROBE_FAILURES_TOTAL: &str = "ioping_probe_failures_total";
pub const RESPONSE_DURATION_SECONDS: &str = "ioping_response_duration_seconds";

const LABEL_TARGET: &str = "target";
const LABEL_MODE: &str = "mode";

/// Exposes probe state at scrape time.
///
/// `ioping_requests_total` and `ioping_probe_failures_total` come from the
/// workers' atomic counters, `ioping_response_duration_seconds` from an
/// aggregator snapshot. The two sources are read independently.
pub struct IopingCollector {
    states: Vec<Arc<ProbeState>>,
    aggregator: Arc<MetricsAggregator>,
    requests: Desc,
    failures: Desc,
    duration: Desc,
}

impl IopingCollector {
    pub fn new(
        states: Vec<Arc<ProbeState>>,
        aggregator: Arc<MetricsAggregator>,
    ) -> prometheus::Result<Self> {
        Ok(Self {
            states,
            aggregator,
            requests: series_desc(REQUESTS_TOTAL, "Number of measurements performed")?,
            failures: series_desc(
                PROBE_FAILURES_TOTAL,
                "Number of measurements that failed to run or to parse",
            )?,
            duration: series_desc(
                RESPONSE_DURATION_SECONDS,
                "A histogram of latencies for ping responses.",
            )?,
        })
    }

    fn counter_family(&self, desc: &Desc, value: impl Fn(&ProbeState) -> u64) -> MetricFamily {
        let metrics = self
            .states
            .iter()
            .map(|state| {
                let mut counter = proto::Counter::default();
                counter.set_value(value(state) as f64);

                let mut metric = proto::Metric::default();
                metric.set_label(labels(&state.target().key()).into());
                metric.set_counter(counter);
                metric
            })
            .collect::<Vec<_>>();

        family(desc, MetricType::COUNTER, metrics)
    }

    fn histogram_family(&self) -> MetricFamily {
        let metrics = self
            .aggregator
            .snapshot()
            .into_iter()
            .map(|series| {
                let buckets = series
                    .histogram
                    .buckets
                    .iter()
                    .map(|b| {
                        let mut bucket = proto::Bucket::default();
                        bucket.set_upper_bound(b.upper_bound);
                        bucket.set_cumulative_count(b.cumulative_count);
                        bucket
                    })
                    .collect::<Vec<_>>();

                let mut histogram = proto::Histogram::default();
                histogram.set_sample_count(series.histogram.count);
                histogram.set_sample_sum(series.histogram.sum);
                histogram.set_bucket(buckets.into());

                let mut metric = proto::Metric::default();
                metric.set_label(labels(&series.key).into());
                metric.set_histogram(histogram);
                metric
            })
            .collect::<Vec<_>>();

        family(&self.duration, MetricType::HISTOGRAM, metrics)
    }
}

impl Collector for IopingCollector {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.requests, &self.failures, &self.duration]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        vec![
            self.counter_family(&self.requests, ProbeState::measurements),
            self.counter_family(&self.failures, ProbeState::failures),
            self.histogram_family(),
        ]
    }
}

fn series_desc(name: &str, help: &str) -> prometheus::Result<Desc> {
    Desc::new(
        name.to_string(),
        help.to_string(),
        vec![LABEL_TARGET.to_string(), LABEL_MODE.to_string()],
        HashMap::new(),
    )
}

/// Label pairs sorted by name.
fn labels(key: &SeriesKey) -> Vec<LabelPair> {
    [(LABEL_MODE, key.mode), (LABEL_TARGET, key.target.as_str())]
        .into_iter()
        .map(|(name, value)| {
            let mut pair = LabelPair::default();
            pair.set_name(name.to_string());
            pair.set_value(value.to_string());
            pair
        })
        .collect()
}

fn family(desc: &Desc, kind: MetricType, metrics: Vec<proto::Metric>) -> MetricFamily {
    let mut mf = MetricFamily::default();
    mf.set_name(desc.fq_name.clone());
    mf.set_help(desc.help.clone());
    mf.set_field_type(kind);
    mf.set_metric(metrics.into());
    mf
}
