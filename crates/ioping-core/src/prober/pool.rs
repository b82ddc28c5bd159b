//! Worker pool: one thread per probe, started with a splay.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info};

use super::runner::ProbeRunner;
use super::signal::ShutdownSignal;
use super::worker::{MeasurementSink, ProbeState, Prober};
use crate::config::ProbeConfig;

/// Start offset between consecutive workers: `interval / workers`.
pub fn splay(interval: Duration, workers: usize) -> Duration {
    match u32::try_from(workers) {
        Ok(0) => Duration::ZERO,
        Ok(n) => interval / n,
        Err(_) => Duration::ZERO,
    }
}

/// Builds the workers for `config`, each with its start delay set.
///
/// Worker `i` starts after `i * splay`, so the last one starts strictly
/// within the first interval.
pub fn plan_probers(
    config: &ProbeConfig,
    runner: Arc<dyn ProbeRunner>,
    sink: Arc<dyn MeasurementSink>,
) -> Vec<Prober> {
    let targets = config.probe_targets();
    let step = splay(config.interval, targets.len());

    targets
        .into_iter()
        .enumerate()
        .map(|(i, target)| {
            Prober::new(
                target,
                config.interval,
                Arc::clone(&runner),
                Arc::clone(&sink),
            )
            .with_start_delay(step * i as u32)
        })
        .collect()
}

/// Running set of probe workers.
///
/// Dropping the pool fires the shutdown signal without waiting;
/// call [`shutdown`](Self::shutdown) to also join the threads.
pub struct ProbePool {
    shutdown: ShutdownSignal,
    states: Vec<Arc<ProbeState>>,
    handles: Vec<JoinHandle<()>>,
}

impl ProbePool {
    /// Spawns one thread per worker planned from `config`.
    pub fn start(
        config: &ProbeConfig,
        runner: Arc<dyn ProbeRunner>,
        sink: Arc<dyn MeasurementSink>,
    ) -> io::Result<Self> {
        let probers = plan_probers(config, runner, sink);
        info!(
            workers = probers.len(),
            splay = ?splay(config.interval, probers.len()),
            "starting probes"
        );
        Self::spawn(probers)
    }

    /// Spawns already built workers.
    pub fn spawn(probers: Vec<Prober>) -> io::Result<Self> {
        let mut pool = Self {
            shutdown: ShutdownSignal::new(),
            states: Vec::with_capacity(probers.len()),
            handles: Vec::with_capacity(probers.len()),
        };

        for (i, prober) in probers.into_iter().enumerate() {
            info!(
                target = %prober.target().path,
                mode = prober.target().mode.label(),
                delay = ?prober.start_delay(),
                "scheduling probe"
            );
            pool.states.push(prober.state());

            let shutdown = pool.shutdown.clone();
            let handle = thread::Builder::new()
                .name(format!("probe-{i}"))
                .spawn(move || prober.run(&shutdown))?;
            pool.handles.push(handle);
        }

        Ok(pool)
    }

    /// Counters of every worker, in start order.
    pub fn states(&self) -> Vec<Arc<ProbeState>> {
        self.states.clone()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// A handle to the pool's shutdown signal.
    pub fn signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Stops every worker and waits for its thread to exit.
    pub fn shutdown(mut self) {
        self.shutdown.cancel();
        for handle in std::mem::take(&mut self.handles) {
            let name = handle.thread().name().unwrap_or("probe").to_string();
            if handle.join().is_err() {
                error!(thread = %name, "probe thread panicked");
            }
        }
        info!(workers = self.states.len(), "all probes stopped");
    }
}

impl Drop for ProbePool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
