//! ioping-core - probing, parsing and metrics for the ioping exporter.
//!
//! Provides:
//! - `prober` - ioping invocation, batch output parser, probe workers and the pool
//! - `metrics` - latency aggregator and the Prometheus scrape bridge
//! - `config` - probe configuration, bucket parsing and validation
//! - `util` - duration parsing for CLI arguments

pub mod config;
pub mod metrics;
pub mod prober;
pub mod util;

/// Crate version, shared by the exporter binary and its build info metric.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
