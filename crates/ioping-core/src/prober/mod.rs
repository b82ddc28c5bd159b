//! ioping probing: invocation, output parsing and the worker pool.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        ProbePool                         │
//! │   ShutdownSignal ──┬──────────────┬──────────────┐       │
//! │             ┌──────▼─────┐ ┌──────▼─────┐ ┌──────▼─────┐ │
//! │             │  Prober 0  │ │  Prober 1  │ │  Prober N  │ │
//! │             │  /a read   │ │  /b read   │ │  /a write  │ │
//! │             └──────┬─────┘ └──────┬─────┘ └──────┬─────┘ │
//! └────────────────────┼──────────────┼──────────────┼───────┘
//!                      │  ProbeRunner (trait)        │
//!              ┌───────┴────────┐            ┌───────┴──────┐
//!              │ IopingCommand  │            │  MockRunner  │
//!              │ (real binary)  │            │  (testing)   │
//!              └───────┬────────┘            └──────────────┘
//!                      │ stdout
//!               parse_statistics ──► MeasurementSink (aggregator)
//! ```
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use ioping_core::config::ProbeConfig;
//! use ioping_core::metrics::MetricsAggregator;
//! use ioping_core::prober::{MockRunner, ProbePool};
//!
//! let config = ProbeConfig {
//!     targets: vec!["/tmp".to_string()],
//!     ..ProbeConfig::default()
//! };
//! let aggregator = Arc::new(MetricsAggregator::for_config(&config).unwrap());
//! let pool = ProbePool::start(&config, Arc::new(MockRunner::healthy()), aggregator).unwrap();
//! assert_eq!(pool.len(), 1);
//! pool.shutdown();
//! ```

pub mod mock;
pub mod parser;
pub mod pool;
pub mod runner;
pub mod signal;
pub mod target;
pub mod worker;

pub use mock::{MockResponse, MockRunner};
pub use parser::{ParseError, Statistics, parse_statistics};
pub use pool::{ProbePool, plan_probers, splay};
pub use runner::{DEFAULT_IOPING_PATH, ExecError, IopingCommand, ProbeRunner};
pub use signal::ShutdownSignal;
pub use target::{ProbeMode, ProbeTarget, SeriesKey};
pub use worker::{MeasurementSink, ProbeError, ProbeState, Prober};
