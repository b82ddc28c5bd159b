//! ioping-exporter - Prometheus exporter for storage latency.
//!
//! Runs ioping against every configured target on a fixed interval and
//! exposes the measured latencies as Prometheus histograms.

mod server;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use prometheus::{IntGaugeVec, Opts, Registry};
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use ioping_core::config::{ConfigError, ProbeConfig, default_buckets, parse_buckets};
use ioping_core::metrics::{IopingCollector, MetricsAggregator};
use ioping_core::prober::{DEFAULT_IOPING_PATH, ProbePool, ProbeState};
use ioping_core::util::parse_duration;
use crate::server::WebConfigError;

/// Prometheus exporter for ioping storage latency.
#[derive(Parser)]
#[command(
    name = "ioping-exporter",
    about = "Prometheus exporter for ioping storage latency",
    version = ioping_core::VERSION
)]
struct Args {
    /// Files, directories or devices to probe.
    #[arg(value_name = "TARGET", required = true)]
    targets: Vec<String>,

    /// Interval between measurements of one target (e.g. "500ms", "1s", "2m").
    #[arg(
        short = 'i',
        long = "ping.interval",
        default_value = "1s",
        value_parser = parse_duration,
        env = "IOPING_EXPORTER_PING_INTERVAL"
    )]
    interval: Duration,

    /// Kill an ioping invocation that runs longer than this.
    #[arg(long = "ping.timeout", value_parser = parse_duration, env = "IOPING_EXPORTER_PING_TIMEOUT")]
    timeout: Option<Duration>,

    /// Also measure write latency (ioping -W). Safe for directories.
    #[arg(long, env = "IOPING_EXPORTER_WRITE")]
    write: bool,

    /// Also measure write latency with ioping -WWW.
    /// Overwrites data on file and device targets.
    #[arg(long, env = "IOPING_EXPORTER_UNSAFEWRITE")]
    unsafewrite: bool,

    /// Comma-separated histogram bucket bounds in seconds.
    /// Default: 20 exponential buckets from 0.00005, doubling.
    #[arg(long, env = "IOPING_EXPORTER_BUCKETS")]
    buckets: Option<String>,

    /// Path to the ioping binary.
    #[arg(long = "ioping.path", default_value = DEFAULT_IOPING_PATH, env = "IOPING_EXPORTER_IOPING_PATH")]
    ioping_path: PathBuf,

    /// How long in-flight measurements may run after a shutdown request.
    #[arg(
        long = "shutdown.grace",
        default_value = "5s",
        value_parser = parse_duration,
        env = "IOPING_EXPORTER_SHUTDOWN_GRACE"
    )]
    grace: Duration,

    /// Address to listen on, "host:port" or ":port".
    #[arg(
        long = "web.listen-address",
        default_value = server::DEFAULT_LISTEN_ADDRESS,
        env = "IOPING_EXPORTER_LISTEN_ADDRESS"
    )]
    listen_address: String,

    /// Path under which metrics are exposed.
    #[arg(
        long = "web.telemetry-path",
        default_value = server::DEFAULT_TELEMETRY_PATH,
        env = "IOPING_EXPORTER_TELEMETRY_PATH"
    )]
    telemetry_path: String,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn probe_config(&self) -> Result<ProbeConfig, ConfigError> {
        let buckets = match &self.buckets {
            Some(list) => parse_buckets(list)?,
            None => default_buckets(),
        };

        let config = ProbeConfig {
            targets: self.targets.clone(),
            interval: self.interval,
            write: self.write,
            unsafe_write: self.unsafewrite,
            buckets,
            ioping_path: self.ioping_path.clone(),
            timeout: self.timeout,
            grace: self.grace,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validated web flags; returns the address to bind.
    fn bind_address(&self) -> Result<String, WebConfigError> {
        server::validate_telemetry_path(&self.telemetry_path)?;
        server::normalize_listen_address(&self.listen_address)
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = ["ioping_exporter", "ioping_core"]
        .iter()
        .fold(EnvFilter::from_default_env(), |filter, krate| {
            let directive = format!("{krate}={level}")
                .parse()
                .unwrap_or_else(|_| LevelFilter::from_level(level).into());
            filter.add_directive(directive)
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Registry with the probe collector and the build info gauge.
fn build_registry(
    states: Vec<Arc<ProbeState>>,
    aggregator: Arc<MetricsAggregator>,
) -> prometheus::Result<Registry> {
    let registry = Registry::new();
    registry.register(Box::new(IopingCollector::new(states, aggregator)?))?;

    let build_info = IntGaugeVec::new(
        Opts::new(
            "ioping_exporter_build_info",
            "A metric with a constant '1' value labeled by version",
        ),
        &["version"],
    )?;
    build_info.with_label_values(&[ioping_core::VERSION]).set(1);
    registry.register(Box::new(build_info))?;

    Ok(registry)
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!(version = ioping_core::VERSION, "ioping-exporter starting");

    let config = match args.probe_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            process::exit(1);
        }
    };
    let listen = match args.bind_address() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "invalid web configuration");
            process::exit(1);
        }
    };

    info!(
        targets = config.targets.len(),
        interval = ?config.interval,
        timeout = ?config.timeout,
        ioping = %config.ioping_path.display(),
        "probe configuration"
    );
    if config.unsafe_write {
        warn!("unsafe write mode enabled: ioping -WWW overwrites data on the targets");
    }

    let aggregator = match MetricsAggregator::for_config(&config) {
        Ok(aggregator) => Arc::new(aggregator),
        Err(e) => {
            error!(error = %e, "invalid configuration");
            process::exit(1);
        }
    };

    let pool = match ProbePool::start(&config, Arc::new(config.runner()), aggregator.clone()) {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "failed to start probe threads");
            process::exit(1);
        }
    };

    let registry = match build_registry(pool.states(), aggregator) {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "failed to register metrics");
            pool.shutdown();
            process::exit(1);
        }
    };

    // Setup graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        shutdown_tx.send_replace(true);
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    let app = server::router(registry, &args.telemetry_path);
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .and_then(|runtime| runtime.block_on(server::serve(&listen, app, shutdown_rx)));

    pool.shutdown();

    if let Err(e) = result {
        error!(error = %e, "http server failed");
        process::exit(1);
    }
    info!("ioping-exporter stopped");
}
