//! Fixed-bucket latency histogram.

/// One cumulative bucket of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSnapshot {
    /// Inclusive upper bound in seconds.
    pub upper_bound: f64,
    /// Observations `<= upper_bound`.
    pub cumulative_count: u64,
}

/// Point-in-time copy of a histogram, buckets cumulative.
///
/// Observations above the last bound only show up in `count`, which is
/// what the `+Inf` bucket reports.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub buckets: Vec<BucketSnapshot>,
    pub count: u64,
    pub sum: f64,
}

/// Histogram with bounds fixed at construction.
///
/// Not synchronized; the aggregator keeps each one behind its own lock.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    bounds: Vec<f64>,
    /// Non-cumulative count per bound.
    counts: Vec<u64>,
    count: u64,
    sum: f64,
}

impl LatencyHistogram {
    /// `bounds` must already be validated as strictly ascending.
    pub fn new(bounds: Vec<f64>) -> Self {
        let counts = vec![0; bounds.len()];
        Self {
            bounds,
            counts,
            count: 0,
            sum: 0.0,
        }
    }

    pub fn observe(&mut self, seconds: f64) {
        self.count += 1;
        self.sum += seconds;
        let idx = self.bounds.partition_point(|&bound| bound < seconds);
        if let Some(slot) = self.counts.get_mut(idx) {
            *slot += 1;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut cumulative = 0;
        let buckets = self
            .bounds
            .iter()
            .zip(&self.counts)
            .map(|(&upper_bound, &n)| {
                cumulative += n;
                BucketSnapshot {
                    upper_bound,
                    cumulative_count: cumulative,
                }
            })
            .collect();

        HistogramSnapshot {
            buckets,
            count: self.count,
            sum: self.sum,
        }
    }
}
