//! Execution of the external ioping binary.
//!
//! The `ProbeRunner` trait lets workers run against the real binary in
//! production and against scripted output (`MockRunner`) in tests.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use super::signal::ShutdownSignal;

/// Default location of the ioping binary.
pub const DEFAULT_IOPING_PATH: &str = "/usr/bin/ioping";

/// First and last sleep between polls of a running child.
const POLL_MIN: Duration = Duration::from_millis(1);
const POLL_MAX: Duration = Duration::from_millis(50);

/// Error type for a failed ioping invocation.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The binary could not be started (missing, not executable, ...).
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    /// The process ran but exited unsuccessfully.
    #[error("{program} exited unsuccessfully (code {code:?}): {stderr}")]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    /// The process exceeded the per-invocation timeout and was killed.
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    /// Shutdown was requested and the grace period ran out.
    #[error("{program} killed on shutdown")]
    Cancelled { program: String },
    /// Waiting on the process or reading its output failed.
    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Runs one ioping measurement and returns its standard output.
pub trait ProbeRunner: Send + Sync {
    /// Executes the tool with `args` and blocks until it exits.
    ///
    /// Implementations must return promptly once `shutdown` has been
    /// cancelled for longer than their grace period.
    fn execute(&self, args: &[String], shutdown: &ShutdownSignal) -> Result<String, ExecError>;
}

/// Runs the real ioping binary as a child process.
#[derive(Debug, Clone)]
pub struct IopingCommand {
    program: PathBuf,
    timeout: Option<Duration>,
    grace: Duration,
}

impl IopingCommand {
    /// Creates a runner for the binary at `program`.
    ///
    /// No timeout is applied and in-flight children are killed as soon as
    /// shutdown fires; see [`with_timeout`](Self::with_timeout) and
    /// [`with_grace`](Self::with_grace).
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
            grace: Duration::ZERO,
        }
    }

    /// Kills an invocation that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Lets an in-flight invocation finish for up to `grace` after shutdown.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl Default for IopingCommand {
    fn default() -> Self {
        Self::new(DEFAULT_IOPING_PATH)
    }
}

impl ProbeRunner for IopingCommand {
    fn execute(&self, args: &[String], shutdown: &ShutdownSignal) -> Result<String, ExecError> {
        let program = self.program_name();
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.clone(),
                source,
            })?;

        // Drain both pipes while the child runs so it never blocks on a full pipe.
        let readers = drain(child.stdout.take())
            .and_then(|stdout| Ok((stdout, drain(child.stderr.take())?)));
        let (stdout_reader, stderr_reader) = match readers {
            Ok(readers) => readers,
            Err(source) => {
                terminate(&mut child);
                return Err(ExecError::Io { program, source });
            }
        };

        let started = Instant::now();
        let mut poll = POLL_MIN;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(source) => {
                    terminate(&mut child);
                    return Err(ExecError::Io { program, source });
                }
            }

            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    warn!(program = %program, ?timeout, "ioping timed out, killing");
                    terminate(&mut child);
                    return Err(ExecError::Timeout { program, timeout });
                }
            }

            if let Some(fired_at) = shutdown.cancelled_at() {
                if fired_at.elapsed() >= self.grace {
                    debug!(program = %program, "killing in-flight ioping on shutdown");
                    terminate(&mut child);
                    return Err(ExecError::Cancelled { program });
                }
            }

            thread::sleep(poll);
            poll = (poll * 2).min(POLL_MAX);
        };

        let stdout = collect(stdout_reader).map_err(|source| ExecError::Io {
            program: program.clone(),
            source,
        })?;

        if !status.success() {
            let stderr = collect(stderr_reader).unwrap_or_default();
            return Err(ExecError::Exit {
                program,
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(stdout)
    }
}

/// Kills and reaps a child, ignoring errors for an already exited process.
fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Reads `pipe` to the end on a helper thread.
///
/// On the timeout and shutdown paths the handle is dropped without joining;
/// the thread exits once every writer of the pipe is gone.
fn drain<R>(pipe: Option<R>) -> io::Result<JoinHandle<io::Result<String>>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("ioping-pipe".to_string())
        .spawn(move || read_pipe(pipe))
}

fn collect(reader: JoinHandle<io::Result<String>>) -> io::Result<String> {
    reader
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("pipe reader panicked")))
}

fn read_pipe<R: Read>(pipe: Option<R>) -> io::Result<String> {
    let mut out = String::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_string(&mut out)?;
    }
    Ok(out)
}
