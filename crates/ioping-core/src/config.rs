//! Probe configuration: targets, schedule and histogram buckets.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::prober::runner::{DEFAULT_IOPING_PATH, IopingCommand};
use crate::prober::target::{ProbeMode, ProbeTarget};

/// Default bucket layout: 20 exponential buckets from 50µs, doubling.
pub const DEFAULT_BUCKET_START: f64 = 0.000_05;
pub const DEFAULT_BUCKET_FACTOR: f64 = 2.0;
pub const DEFAULT_BUCKET_COUNT: usize = 20;

/// Configuration rejected at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no targets configured")]
    EmptyTargets,
    #[error("target #{index} is empty")]
    EmptyTarget { index: usize },
    #[error("target {0:?} is listed more than once")]
    DuplicateTarget(String),
    #[error("bucket list is empty")]
    EmptyBuckets,
    #[error("invalid bucket {value:?}: {reason}")]
    InvalidBucket { value: String, reason: String },
    #[error("buckets must be strictly ascending: {prev} is followed by {next}")]
    BucketsNotAscending { prev: f64, next: f64 },
    #[error("probe interval must be greater than zero")]
    ZeroInterval,
}

/// Default histogram buckets in seconds.
pub fn default_buckets() -> Vec<f64> {
    (0..DEFAULT_BUCKET_COUNT)
        .scan(DEFAULT_BUCKET_START, |bound, _| {
            let current = *bound;
            *bound *= DEFAULT_BUCKET_FACTOR;
            Some(current)
        })
        .collect()
}

/// Parses a comma separated list of bucket bounds in seconds.
///
/// Whitespace around entries is ignored. The result is validated with
/// [`validate_buckets`].
pub fn parse_buckets(input: &str) -> Result<Vec<f64>, ConfigError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyBuckets);
    }

    let buckets = trimmed
        .split(',')
        .map(|raw| {
            let raw = raw.trim();
            raw.parse::<f64>().map_err(|e| ConfigError::InvalidBucket {
                value: raw.to_string(),
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    validate_buckets(&buckets)?;
    Ok(buckets)
}

/// Checks that bounds are non-empty, finite, positive and strictly ascending.
pub fn validate_buckets(buckets: &[f64]) -> Result<(), ConfigError> {
    if buckets.is_empty() {
        return Err(ConfigError::EmptyBuckets);
    }
    for &bound in buckets {
        if !bound.is_finite() || bound <= 0.0 {
            return Err(ConfigError::InvalidBucket {
                value: bound.to_string(),
                reason: "must be a positive finite number of seconds".to_string(),
            });
        }
    }
    for pair in buckets.windows(2) {
        if pair[1] <= pair[0] {
            return Err(ConfigError::BucketsNotAscending {
                prev: pair[0],
                next: pair[1],
            });
        }
    }
    Ok(())
}

/// Everything the probe pool needs to start.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    /// Paths or devices, in command-line order.
    pub targets: Vec<String>,
    pub interval: Duration,
    /// Add a `-W` worker per target.
    pub write: bool,
    /// Add a `-WWW` worker per target. Takes precedence over `write`.
    pub unsafe_write: bool,
    /// Histogram upper bounds in seconds.
    pub buckets: Vec<f64>,
    pub ioping_path: PathBuf,
    /// Per-invocation limit; `None` waits for ioping indefinitely.
    pub timeout: Option<Duration>,
    /// How long an in-flight ioping may keep running after shutdown.
    pub grace: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            interval: Duration::from_secs(1),
            write: false,
            unsafe_write: false,
            buckets: default_buckets(),
            ioping_path: PathBuf::from(DEFAULT_IOPING_PATH),
            timeout: None,
            grace: Duration::from_secs(5),
        }
    }
}

impl ProbeConfig {
    /// Write mode applied to every target, if any.
    pub fn write_mode(&self) -> Option<ProbeMode> {
        if self.unsafe_write {
            Some(ProbeMode::UnsafeWrite)
        } else if self.write {
            Some(ProbeMode::Write)
        } else {
            None
        }
    }

    /// All (target, mode) pairs: every read probe first, then every write probe.
    pub fn probe_targets(&self) -> Vec<ProbeTarget> {
        let reads = self
            .targets
            .iter()
            .map(|path| ProbeTarget::new(path.as_str(), ProbeMode::Read));
        let writes = self.write_mode().into_iter().flat_map(|mode| {
            self.targets
                .iter()
                .map(move |path| ProbeTarget::new(path.as_str(), mode))
        });
        reads.chain(writes).collect()
    }

    /// Runner for the configured ioping binary, timeout and grace period.
    pub fn runner(&self) -> IopingCommand {
        IopingCommand::new(&self.ioping_path)
            .with_timeout(self.timeout)
            .with_grace(self.grace)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::EmptyTargets);
        }

        let mut seen = HashSet::with_capacity(self.targets.len());
        for (index, target) in self.targets.iter().enumerate() {
            if target.trim().is_empty() {
                return Err(ConfigError::EmptyTarget { index });
            }
            if !seen.insert(target.as_str()) {
                return Err(ConfigError::DuplicateTarget(target.clone()));
            }
        }

        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }

        validate_buckets(&self.buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(targets: &[&str]) -> ProbeConfig {
        ProbeConfig {
            targets: targets.iter().map(|t| t.to_string()).collect(),
            ..ProbeConfig::default()
        }
    }

    #[test]
    fn test_default_buckets_match_exponential_layout() {
        let buckets = default_buckets();
        assert_eq!(buckets.len(), 20);
        assert_eq!(buckets[0], 0.000_05);
        assert!((buckets[19] - 0.000_05 * 2f64.powi(19)).abs() < 1e-12);

        let reference = prometheus::exponential_buckets(
            DEFAULT_BUCKET_START,
            DEFAULT_BUCKET_FACTOR,
            DEFAULT_BUCKET_COUNT,
        )
        .unwrap();
        assert_eq!(buckets, reference);
    }

    #[test]
    fn test_parse_buckets() {
        assert_eq!(
            parse_buckets("0.001, 0.01,0.1 ,1").unwrap(),
            vec![0.001, 0.01, 0.1, 1.0]
        );
        assert_eq!(parse_buckets("5e-05").unwrap(), vec![0.000_05]);
    }

    #[test]
    fn test_parse_buckets_rejects_bad_lists() {
        assert_eq!(parse_buckets("  "), Err(ConfigError::EmptyBuckets));
        assert!(matches!(
            parse_buckets("0.1,fast"),
            Err(ConfigError::InvalidBucket { value, .. }) if value == "fast"
        ));
        assert!(matches!(
            parse_buckets("0.1,,0.2"),
            Err(ConfigError::InvalidBucket { .. })
        ));
        assert!(matches!(
            parse_buckets("0.1,0.05"),
            Err(ConfigError::BucketsNotAscending { .. })
        ));
        assert!(matches!(
            parse_buckets("0.1,0.1"),
            Err(ConfigError::BucketsNotAscending { .. })
        ));
        assert!(matches!(
            parse_buckets("-1,1"),
            Err(ConfigError::InvalidBucket { .. })
        ));
        assert!(matches!(
            parse_buckets("0.1,inf"),
            Err(ConfigError::InvalidBucket { .. })
        ));
    }

    #[test]
    fn test_validate() {
        assert!(config(&["/tmp", "/dev/sda"]).validate().is_ok());
        assert_eq!(config(&[]).validate(), Err(ConfigError::EmptyTargets));
        assert_eq!(
            config(&["/tmp", " "]).validate(),
            Err(ConfigError::EmptyTarget { index: 1 })
        );
        assert_eq!(
            config(&["/tmp", "/var", "/tmp"]).validate(),
            Err(ConfigError::DuplicateTarget("/tmp".to_string()))
        );

        let zero = ProbeConfig {
            interval: Duration::ZERO,
            ..config(&["/tmp"])
        };
        assert_eq!(zero.validate(), Err(ConfigError::ZeroInterval));

        let no_buckets = ProbeConfig {
            buckets: Vec::new(),
            ..config(&["/tmp"])
        };
        assert_eq!(no_buckets.validate(), Err(ConfigError::EmptyBuckets));
    }

    #[test]
    fn test_probe_targets_read_only() {
        let targets = config(&["/a", "/b"]).probe_targets();
        assert_eq!(
            targets,
            vec![
                ProbeTarget::new("/a", ProbeMode::Read),
                ProbeTarget::new("/b", ProbeMode::Read),
            ]
        );
    }

    #[test]
    fn test_unsafe_write_takes_precedence() {
        let cfg = ProbeConfig {
            write: true,
            unsafe_write: true,
            ..config(&["/dev/sdb"])
        };
        assert_eq!(cfg.write_mode(), Some(ProbeMode::UnsafeWrite));
        assert_eq!(
            cfg.probe_targets(),
            vec![
                ProbeTarget::new("/dev/sdb", ProbeMode::Read),
                ProbeTarget::new("/dev/sdb", ProbeMode::UnsafeWrite),
            ]
        );
    }

    #[test]
    fn test_runner_uses_configured_binary() {
        let cfg = ProbeConfig {
            ioping_path: PathBuf::from("/opt/ioping/bin/ioping"),
            ..config(&["/tmp"])
        };
        assert_eq!(
            cfg.runner().program(),
            std::path::Path::new("/opt/ioping/bin/ioping")
        );
    }
}
