//! Scripted ioping runner for testing workers without the real binary.
//!
//! `MockRunner` replays a queue of canned outputs and records the argument
//! list of every invocation. Once the queue is drained it keeps returning
//! the fallback response.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::runner::{ExecError, ProbeRunner};
use super::signal::ShutdownSignal;

/// Canned result for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum MockResponse {
    /// Process exited successfully with this stdout.
    Output(String),
    /// Process exited with this status code and stderr.
    Exit { code: i32, stderr: String },
    /// Binary could not be started.
    NotFound,
}

impl MockResponse {
    pub fn output(line: impl Into<String>) -> Self {
        MockResponse::Output(line.into())
    }

    /// A successful single-request batch line with the given max latency.
    pub fn latency_ns(max_ns: u64) -> Self {
        MockResponse::Output(format!(
            "1 {max_ns} 1000.0 4096000.0 {max_ns} {max_ns} {max_ns} 0 1 {max_ns}\n"
        ))
    }

    fn into_result(self) -> Result<String, ExecError> {
        match self {
            MockResponse::Output(out) => Ok(out),
            MockResponse::Exit { code, stderr } => Err(ExecError::Exit {
                program: "mock-ioping".to_string(),
                code: Some(code),
                stderr,
            }),
            MockResponse::NotFound => Err(ExecError::Spawn {
                program: "mock-ioping".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }),
        }
    }
}

/// In-memory [`ProbeRunner`] for tests.
#[derive(Debug)]
pub struct MockRunner {
    responses: Mutex<VecDeque<MockResponse>>,
    fallback: MockResponse,
    calls: Mutex<Vec<Vec<String>>>,
}

impl MockRunner {
    /// Creates a runner that always answers with `fallback`.
    pub fn new(fallback: MockResponse) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Runner answering with a fixed, valid measurement.
    pub fn healthy() -> Self {
        Self::new(MockResponse::latency_ns(250_000))
    }

    /// Queues responses served before the fallback.
    pub fn with_responses(self, responses: impl IntoIterator<Item = MockResponse>) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(responses);
        self
    }

    /// Argument lists of all invocations so far, oldest first.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ProbeRunner for MockRunner {
    fn execute(&self, args: &[String], _shutdown: &ShutdownSignal) -> Result<String, ExecError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(args.to_vec());

        let next = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.unwrap_or_else(|| self.fallback.clone()).into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_then_fallback() {
        let runner = MockRunner::new(MockResponse::output("fallback")).with_responses([
            MockResponse::output("first"),
            MockResponse::NotFound,
        ]);
        let signal = ShutdownSignal::new();

        assert_eq!(runner.execute(&[], &signal).unwrap(), "first");
        assert!(matches!(
            runner.execute(&[], &signal),
            Err(ExecError::Spawn { .. })
        ));
        assert_eq!(runner.execute(&[], &signal).unwrap(), "fallback");
        assert_eq!(runner.execute(&[], &signal).unwrap(), "fallback");
        assert_eq!(runner.call_count(), 4);
    }

    #[test]
    fn test_records_arguments() {
        let runner = MockRunner::healthy();
        let args = vec!["-batch".to_string(), "/tmp".to_string()];
        runner.execute(&args, &ShutdownSignal::new()).unwrap();

        assert_eq!(runner.calls(), vec![args]);
    }
}
