//! Direct execution backend: no added isolation.
//!
//! For trusted and test contexts only. The command inherits the gateway's
//! environment (plus request overrides); output and time bounds still
//! apply.

use async_trait::async_trait;

use super::run::{RunBounds, SpawnSpec, run_bounded};
use super::{BackendKind, ExecBackend, ExecError, ExecRequest, ExecResult, split_argv};

#[derive(Debug, Default)]
pub struct DirectBackend;

impl DirectBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecBackend for DirectBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Direct
    }

    fn check_available(&self) -> Result<(), ExecError> {
        Ok(())
    }

    async fn run(&self, request: &ExecRequest) -> Result<ExecResult, ExecError> {
        let (program, args) = split_argv(&request.cmd)?;
        run_bounded(
            SpawnSpec {
                program: program.clone(),
                args: args.to_vec(),
                cwd: request.cwd.clone(),
                env: request.env.clone(),
            },
            RunBounds {
                max_bytes: request.max_bytes,
                timeout: request.timeout(),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExitDisposition;
    use std::time::Duration;
    use std::time::Instant;

    #[tokio::test]
    async fn echo_exits_zero_with_expected_stdout() {
        let backend = DirectBackend::new();
        let result = backend
            .run(&ExecRequest::new(["/bin/echo", "hello"]))
            .await
            .unwrap();
        assert_eq!(result.exit, ExitDisposition::Exited { code: 0 });
        assert_eq!(result.stdout, b"hello\n");
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_errored() {
        let backend = DirectBackend::new();
        let result = backend
            .run(&ExecRequest::new(["/bin/sh", "-c", "exit 3"]))
            .await
            .unwrap();
        assert_eq!(result.exit, ExitDisposition::Exited { code: 3 });
    }

    #[tokio::test]
    async fn stderr_is_captured_separately() {
        let backend = DirectBackend::new();
        let result = backend
            .run(&ExecRequest::new(["/bin/sh", "-c", "echo out; echo err >&2"]))
            .await
            .unwrap();
        assert_eq!(result.stdout, b"out\n");
        assert_eq!(result.stderr, b"err\n");
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let backend = DirectBackend::new();
        let started = Instant::now();
        let result = backend
            .run(&ExecRequest::new(["/bin/sh", "-c", "sleep 30"]).timeout_ms(200))
            .await
            .unwrap();
        assert_eq!(result.exit, ExitDisposition::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn timeout_reaches_grandchildren() {
        // The sleep is a child of the spawned shell; the group kill must
        // take it down too, or the drain would hang on the open pipe.
        let backend = DirectBackend::new();
        let started = Instant::now();
        let result = backend
            .run(&ExecRequest::new(["/bin/sh", "-c", "sleep 30 & wait"]).timeout_ms(200))
            .await
            .unwrap();
        assert_eq!(result.exit, ExitDisposition::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn output_overflow_truncates_and_terminates() {
        let backend = DirectBackend::new();
        let request = ExecRequest::new(["/bin/sh", "-c", "yes overflow"])
            .max_bytes(4096)
            .timeout_ms(10_000);
        let started = Instant::now();
        let result = backend.run(&request).await.unwrap();
        assert_eq!(result.exit, ExitDisposition::OutputTruncated);
        assert!(result.stdout.len() + result.stderr.len() <= 4096);
        // Terminated on overflow, not at the 10s timeout.
        assert!(started.elapsed() < Duration::from_secs(8));
    }

    #[tokio::test]
    async fn combined_capture_respects_shared_budget() {
        let backend = DirectBackend::new();
        let request = ExecRequest::new([
            "/bin/sh",
            "-c",
            "head -c 600 /dev/zero | tr '\\0' a; head -c 600 /dev/zero | tr '\\0' b >&2",
        ])
        .max_bytes(1000);
        let result = backend.run(&request).await.unwrap();
        assert_eq!(result.exit, ExitDisposition::OutputTruncated);
        assert!(result.stdout.len() + result.stderr.len() <= 1000);
    }

    #[tokio::test]
    async fn cwd_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DirectBackend::new();
        let result = backend
            .run(&ExecRequest::new(["/bin/sh", "-c", "pwd"]).cwd(dir.path()))
            .await
            .unwrap();
        let printed = result.stdout_lossy();
        let printed = printed.trim_end();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(printed).canonicalize().unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn env_overrides_are_visible() {
        let backend = DirectBackend::new();
        let mut request = ExecRequest::new(["/bin/sh", "-c", "printf %s \"$TOOLGATE_TEST_VAR\""]);
        request
            .env
            .insert("TOOLGATE_TEST_VAR".to_string(), "42".to_string());
        let result = backend.run(&request).await.unwrap();
        assert_eq!(result.stdout, b"42");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_failed() {
        let backend = DirectBackend::new();
        let err = backend
            .run(&ExecRequest::new(["/nonexistent/toolgate-test-binary"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::SpawnFailed(_)));
    }
}
