//! Shared bounded runner used by every exec backend.
//!
//! Backends differ only in the argv they build; the spawn/bound/kill loop
//! lives here. Children are started in their own process group so that
//! timeout and overflow kills reach grandchildren, and the child is always
//! reaped after a kill so no zombie remains.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::stream::{CaptureSink, read_capped};
use super::{ExecError, ExecResult, ExitDisposition};

/// How long to wait for output streams to reach EOF after the child exits.
/// Grandchildren that inherited the pipes can hold them open; past this
/// grace the group is killed and capture stops.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Fully resolved spawn parameters produced by a backend.
pub(crate) struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

/// Bounds enforced by the runner regardless of backend.
pub(crate) struct RunBounds {
    pub max_bytes: usize,
    pub timeout: Duration,
}

/// Kill the child's whole process group, falling back to the child alone.
fn kill_group(pid: Option<u32>, child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        let pgid = unsafe { libc::getpgid(pid as libc::pid_t) };
        if pgid > 0 {
            let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
            if rc == 0 {
                return;
            }
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!(%pid, %err, "killpg failed; falling back to killing the child");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
    if let Err(err) = child.start_kill() {
        debug!(%err, "child kill failed (likely already exited)");
    }
}

/// Spawn `spec` and run it to completion or bounded failure.
pub(crate) async fn run_bounded(spec: SpawnSpec, bounds: RunBounds) -> Result<ExecResult, ExecError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &spec.env {
        command.env(key, value);
    }
    #[cfg(unix)]
    unsafe {
        command.pre_exec(|| {
            // The child leads its own group; group kills reach grandchildren.
            if libc::setpgid(0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let started = Instant::now();
    let mut child = command.spawn().map_err(ExecError::SpawnFailed)?;
    let pid = child.id();

    let stdout = child.stdout.take().ok_or_else(|| {
        ExecError::SpawnFailed(std::io::Error::other("child stdout pipe missing"))
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        ExecError::SpawnFailed(std::io::Error::other("child stderr pipe missing"))
    })?;

    let budget = Arc::new(AtomicUsize::new(bounds.max_bytes));
    let overflowed = Arc::new(AtomicBool::new(false));
    let on_overflow = Arc::new(Notify::new());
    let stdout_sink = CaptureSink::new();
    let stderr_sink = CaptureSink::new();

    let mut stdout_task = tokio::spawn(read_capped(
        stdout,
        stdout_sink.clone(),
        Arc::clone(&budget),
        Arc::clone(&overflowed),
        Arc::clone(&on_overflow),
    ));
    let mut stderr_task = tokio::spawn(read_capped(
        stderr,
        stderr_sink.clone(),
        Arc::clone(&budget),
        Arc::clone(&overflowed),
        Arc::clone(&on_overflow),
    ));

    let mut timed_out = false;
    let mut exit_status = None;
    tokio::select! {
        status = child.wait() => {
            exit_status = Some(status.map_err(ExecError::SpawnFailed)?);
        }
        _ = on_overflow.notified() => {
            debug!(program = %spec.program, "output cap reached; terminating process group");
            kill_group(pid, &mut child);
        }
        _ = tokio::time::sleep(bounds.timeout) => {
            timed_out = true;
            debug!(program = %spec.program, timeout = ?bounds.timeout, "timeout expired; terminating process group");
            kill_group(pid, &mut child);
        }
    }

    // Reap. After a kill this also guarantees no zombie remains.
    let status = match exit_status {
        Some(status) => status,
        None => child.wait().await.map_err(ExecError::SpawnFailed)?,
    };

    // Wait for the readers to see EOF; inherited pipe holders are killed off
    // past the grace period.
    for task in [&mut stdout_task, &mut stderr_task] {
        if tokio::time::timeout(DRAIN_GRACE, &mut *task).await.is_err() {
            kill_group(pid, &mut child);
            if tokio::time::timeout(DRAIN_GRACE, &mut *task).await.is_err() {
                warn!(program = %spec.program, "output stream never reached EOF; abandoning capture task");
                task.abort();
            }
        }
    }

    let duration = started.elapsed();
    let exit = if overflowed.load(Ordering::SeqCst) {
        ExitDisposition::OutputTruncated
    } else if timed_out {
        ExitDisposition::TimedOut
    } else {
        ExitDisposition::Exited {
            code: exit_code(&status),
        }
    };

    Ok(ExecResult {
        exit,
        stdout: stdout_sink.take(),
        stderr: stderr_sink.take(),
        duration,
    })
}

#[cfg(unix)]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
