//! Probe worker: one (target, mode) pair measured on a fixed interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::parser::{ParseError, Statistics, parse_statistics};
use super::runner::{ExecError, ProbeRunner};
use super::signal::ShutdownSignal;
use super::target::ProbeTarget;

/// Receives every successfully parsed measurement.
pub trait MeasurementSink: Send + Sync {
    fn observe(&self, stats: &Statistics);
}

/// Why a single tick produced no measurement.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ProbeError {
    /// Short reason used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Exec(_) => "exec",
            ProbeError::Parse(_) => "parse",
        }
    }
}

/// Counters of one worker, shared with the scrape bridge.
#[derive(Debug)]
pub struct ProbeState {
    target: ProbeTarget,
    /// Tick attempts, successful or not.
    measurements: AtomicU64,
    /// Ticks that ended in an exec or parse error.
    failures: AtomicU64,
}

impl ProbeState {
    pub fn new(target: ProbeTarget) -> Self {
        Self {
            target,
            measurements: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn target(&self) -> &ProbeTarget {
        &self.target
    }

    pub fn measurements(&self) -> u64 {
        self.measurements.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Runs ioping against one target on a fixed-rate schedule.
///
/// State per tick: invoke → count attempt → parse → publish. Failures are
/// logged and skipped; the next tick is the retry.
pub struct Prober {
    state: Arc<ProbeState>,
    args: Vec<String>,
    interval: Duration,
    start_delay: Duration,
    runner: Arc<dyn ProbeRunner>,
    sink: Arc<dyn MeasurementSink>,
}

impl Prober {
    pub fn new(
        target: ProbeTarget,
        interval: Duration,
        runner: Arc<dyn ProbeRunner>,
        sink: Arc<dyn MeasurementSink>,
    ) -> Self {
        Self {
            args: target.ioping_args(),
            state: Arc::new(ProbeState::new(target)),
            interval,
            start_delay: Duration::ZERO,
            runner,
            sink,
        }
    }

    /// Delays the first tick, used to splay workers across one interval.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn state(&self) -> Arc<ProbeState> {
        Arc::clone(&self.state)
    }

    pub fn target(&self) -> &ProbeTarget {
        self.state.target()
    }

    pub fn start_delay(&self) -> Duration {
        self.start_delay
    }

    /// Performs one measurement and publishes it on success.
    ///
    /// The attempt counter is bumped whether or not the tick succeeds; the
    /// failure counter for every error except cancellation.
    pub fn tick(&self, shutdown: &ShutdownSignal) -> Result<Statistics, ProbeError> {
        let output = self.runner.execute(&self.args, shutdown);
        self.state.measurements.fetch_add(1, Ordering::Relaxed);

        let target = self.state.target();
        let result = output
            .map_err(ProbeError::from)
            .and_then(|out| {
                parse_statistics(&target.path, target.mode, &out).map_err(ProbeError::from)
            });
        match &result {
            Ok(stats) => self.sink.observe(stats),
            Err(ProbeError::Exec(ExecError::Cancelled { .. })) => {}
            Err(_) => {
                self.state.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Blocks until `shutdown` fires, ticking every interval.
    pub fn run(&self, shutdown: &ShutdownSignal) {
        let target = self.state.target();

        if shutdown.wait_timeout(self.start_delay) {
            return;
        }
        info!(target = %target.path, mode = target.mode.label(), "probe started");

        let mut scheduled = Instant::now();
        loop {
            match self.tick(shutdown) {
                Ok(stats) => {
                    debug!(
                        target = %target.path,
                        mode = target.mode.label(),
                        max_ns = stats.max_ns,
                        seconds = stats.max_ns as f64 * 1e-9,
                        "measurement"
                    );
                }
                Err(ProbeError::Exec(ExecError::Cancelled { .. })) => break,
                Err(e) => {
                    warn!(
                        target = %target.path,
                        mode = target.mode.label(),
                        kind = e.kind(),
                        error = %e,
                        "probe failed"
                    );
                }
            }

            scheduled = next_tick(scheduled, self.interval, Instant::now());
            if shutdown.wait_timeout(scheduled.saturating_duration_since(Instant::now())) {
                break;
            }
        }

        info!(
            target = %target.path,
            mode = target.mode.label(),
            measurements = self.state.measurements(),
            "probe stopped"
        );
    }
}

/// Next tick after `scheduled`, skipping ticks already missed at `now`.
fn next_tick(scheduled: Instant, interval: Duration, now: Instant) -> Instant {
    let next = scheduled + interval;
    if next > now || interval.is_zero() {
        return next;
    }
    let missed = (now - next).as_nanos() / interval.as_nanos() + 1;
    u32::try_from(missed)
        .ok()
        .and_then(|n| interval.checked_mul(n))
        .map_or(now, |skip| next + skip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prober::mock::{MockResponse, MockRunner};
    use crate::prober::target::{ProbeMode, WRITE_FLAG};
    use std::sync::Mutex;
    use std::thread;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<Statistics>>,
    }

    impl MeasurementSink for RecordingSink {
        fn observe(&self, stats: &Statistics) {
            self.seen.lock().unwrap().push(stats.clone());
        }
    }

    fn prober(runner: Arc<MockRunner>, sink: Arc<RecordingSink>, mode: ProbeMode) -> Prober {
        Prober::new(
            ProbeTarget::new("/tmp", mode),
            Duration::from_millis(10),
            runner,
            sink,
        )
    }

    #[test]
    fn test_tick_publishes_measurement() {
        let runner = Arc::new(MockRunner::new(MockResponse::latency_ns(987_654)));
        let sink = Arc::new(RecordingSink::default());
        let p = prober(runner.clone(), sink.clone(), ProbeMode::Write);

        let stats = p.tick(&ShutdownSignal::new()).unwrap();

        assert_eq!(stats.max_ns, 987_654);
        assert_eq!(stats.mode, ProbeMode::Write);
        assert_eq!(p.state().measurements(), 1);
        assert_eq!(sink.seen.lock().unwrap().len(), 1);
        assert!(runner.calls()[0].iter().any(|a| a == WRITE_FLAG));
    }

    #[test]
    fn test_parse_failure_counts_attempt_without_publishing() {
        let runner = Arc::new(MockRunner::new(MockResponse::output("garbage")));
        let sink = Arc::new(RecordingSink::default());
        let p = prober(runner, sink.clone(), ProbeMode::Read);

        let err = p.tick(&ShutdownSignal::new()).unwrap_err();

        assert!(matches!(err, ProbeError::Parse(_)));
        assert_eq!(p.state().measurements(), 1);
        assert_eq!(p.state().failures(), 1);
        assert!(sink.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_exec_failure_counts_attempt_without_publishing() {
        let runner = Arc::new(MockRunner::new(MockResponse::Exit {
            code: 1,
            stderr: "permission denied".to_string(),
        }));
        let sink = Arc::new(RecordingSink::default());
        let p = prober(runner, sink.clone(), ProbeMode::Read);

        let err = p.tick(&ShutdownSignal::new()).unwrap_err();

        assert_eq!(err.kind(), "exec");
        assert_eq!(p.state().measurements(), 1);
        assert!(sink.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_run_survives_failures_and_stops_on_shutdown() {
        let runner = Arc::new(MockRunner::healthy().with_responses([
            MockResponse::NotFound,
            MockResponse::output("1 2"),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let p = prober(runner.clone(), sink.clone(), ProbeMode::Read);
        let state = p.state();
        let shutdown = ShutdownSignal::new();

        let worker = {
            let shutdown = shutdown.clone();
            thread::spawn(move || p.run(&shutdown))
        };

        let deadline = Instant::now() + Duration::from_secs(10);
        while state.measurements() < 5 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        shutdown.cancel();
        worker.join().unwrap();

        let measurements = state.measurements();
        assert!(measurements >= 5, "only {measurements} ticks");
        assert_eq!(state.failures(), 2);
        assert_eq!(sink.seen.lock().unwrap().len() as u64, measurements - 2);
        assert_eq!(runner.call_count() as u64, measurements);
    }

    #[test]
    fn test_shutdown_during_start_delay_skips_ticks() {
        let runner = Arc::new(MockRunner::healthy());
        let sink = Arc::new(RecordingSink::default());
        let p = prober(runner.clone(), sink, ProbeMode::Read)
            .with_start_delay(Duration::from_secs(60));
        let shutdown = ShutdownSignal::new();
        shutdown.cancel();

        p.run(&shutdown);
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn test_next_tick_on_schedule() {
        let start = Instant::now();
        let interval = Duration::from_secs(1);

        let next = next_tick(start, interval, start + Duration::from_millis(200));
        assert_eq!(next, start + interval);
    }

    #[test]
    fn test_next_tick_skips_missed_ticks() {
        let start = Instant::now();
        let interval = Duration::from_secs(1);

        // Cycle overran by 2.5 intervals: ticks at +1s and +2s are skipped.
        let next = next_tick(start, interval, start + Duration::from_millis(2500));
        assert_eq!(next, start + Duration::from_secs(3));
    }
}
