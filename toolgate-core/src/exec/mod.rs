//! Sandboxed execution layer.
//!
//! One contract, four isolation strategies. Every backend accepts an
//! [`ExecRequest`] and returns an [`ExecResult`] whose captured output never
//! exceeds `max_bytes` and whose wall-clock time never exceeds
//! `timeout_ms`. Hitting either bound terminates the whole process group:
//! an overflowing command reports [`ExitDisposition::OutputTruncated`], an
//! overrunning one reports [`ExitDisposition::TimedOut`]. A non-zero exit
//! code is a normal [`ExitDisposition::Exited`], not an error of this
//! layer. Nothing here retries; retry policy belongs to the caller.

mod bubblewrap;
mod container;
mod direct;
mod run;
mod seatbelt;
mod server;
mod stream;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use bubblewrap::{BindMount, BubblewrapBackend};
pub use container::ContainerBackend;
pub use direct::DirectBackend;
pub use seatbelt::{DEFAULT_SANDBOX_EXEC, SeatbeltBackend};
pub use server::{ExecLimits, ExecToolBackend};

/// Default cap on captured stdout+stderr bytes.
pub const DEFAULT_MAX_BYTES: usize = 128 * 1024;

/// Default wall-clock bound for one command.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

fn default_max_bytes() -> usize {
    DEFAULT_MAX_BYTES
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// One command to run under a backend's isolation strategy.
///
/// `cmd` is an argv list passed to the executable with no shell
/// interpretation; use `["sh", "-c", ...]` explicitly for shell features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    pub cmd: Vec<String>,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ExecRequest {
    pub fn new<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            max_bytes: DEFAULT_MAX_BYTES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// How the command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitDisposition {
    /// The process ran to completion. Zero and non-zero are both here.
    Exited { code: i32 },
    /// The wall-clock bound expired; the process group was killed.
    TimedOut,
    /// The output cap was reached; capture stopped and the process group
    /// was killed. Captured bytes never exceed the cap.
    OutputTruncated,
}

/// Outcome of one bounded execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit: ExitDisposition,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl ExecResult {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Which isolation strategy a backend implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Direct,
    Bubblewrap,
    Seatbelt,
    Container,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Direct => "direct",
            Self::Bubblewrap => "bubblewrap",
            Self::Seatbelt => "seatbelt",
            Self::Container => "container",
        };
        f.write_str(name)
    }
}

/// Failures of the execution layer itself.
///
/// Bounded outcomes ([`ExitDisposition::TimedOut`],
/// [`ExitDisposition::OutputTruncated`]) are results, not errors.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The backend cannot run on this host. Callers must check availability
    /// and fail fast; backends never silently degrade to direct execution.
    #[error("{backend} backend is unavailable on this host: {reason}")]
    UnsupportedPlatform { backend: BackendKind, reason: String },

    /// The command could not be started.
    #[error("failed to spawn command: {0}")]
    SpawnFailed(#[source] std::io::Error),
}

/// One isolation strategy behind the shared contract.
#[async_trait]
pub trait ExecBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Fail fast when the strategy cannot work on this host.
    fn check_available(&self) -> Result<(), ExecError>;

    /// Run one command to completion or bounded failure.
    async fn run(&self, request: &ExecRequest) -> Result<ExecResult, ExecError>;
}

/// Split an argv list into program and arguments, rejecting empty commands
/// before anything is spawned.
pub(crate) fn split_argv(cmd: &[String]) -> Result<(&String, &[String]), ExecError> {
    match cmd.split_first() {
        Some(pair) => Ok(pair),
        None => Err(ExecError::SpawnFailed(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty command",
        ))),
    }
}
