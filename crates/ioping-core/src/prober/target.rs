//! Probe targets and the ioping command line built for them.

use std::fmt;

/// Base ioping flags: no warmup, no pause, one synchronous request, batch output.
const BASE_ARGS: [&str; 5] = ["-warmup=0", "-interval=0ms", "-batch", "-count=1", "-sync"];

/// Write flag, safe for directory targets.
pub const WRITE_FLAG: &str = "-W";

/// Destructive write flag for files and devices (see ioping(1)).
pub const UNSAFE_WRITE_FLAG: &str = "-WWW";

/// Access pattern exercised against a target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProbeMode {
    #[default]
    Read,
    Write,
    /// Destructive write. Reported under the `write` label.
    UnsafeWrite,
}

impl ProbeMode {
    /// Metric label value: `read` or `write`.
    pub fn label(self) -> &'static str {
        match self {
            ProbeMode::Read => "read",
            ProbeMode::Write | ProbeMode::UnsafeWrite => "write",
        }
    }

    /// Extra ioping flag for this mode, if any.
    pub fn flag(self) -> Option<&'static str> {
        match self {
            ProbeMode::Read => None,
            ProbeMode::Write => Some(WRITE_FLAG),
            ProbeMode::UnsafeWrite => Some(UNSAFE_WRITE_FLAG),
        }
    }
}

impl fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A path/device plus the mode it is probed with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeTarget {
    pub path: String,
    pub mode: ProbeMode,
}

impl ProbeTarget {
    pub fn new(path: impl Into<String>, mode: ProbeMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    /// Series key used by the aggregator and the scrape bridge.
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(&self.path, self.mode)
    }

    /// ioping arguments for one measurement; the target path comes last.
    pub fn ioping_args(&self) -> Vec<String> {
        let mut args: Vec<String> = BASE_ARGS.iter().map(|s| s.to_string()).collect();
        if let Some(flag) = self.mode.flag() {
            args.push(flag.to_string());
        }
        args.push(self.path.clone());
        args
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.mode)
    }
}

/// (target, mode label) pair identifying one metric series.
///
/// `Write` and `UnsafeWrite` targets share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub target: String,
    pub mode: &'static str,
}

impl SeriesKey {
    pub fn new(target: &str, mode: ProbeMode) -> Self {
        Self {
            target: target.to_string(),
            mode: mode.label(),
        }
    }
}
