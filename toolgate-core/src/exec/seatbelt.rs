//! Profile-sandboxed execution backend built on macOS seatbelt.
//!
//! The configured [`SandboxPolicy`] is compiled to SBPL once per run,
//! written to a temporary profile file, and the command is launched under
//! `sandbox-exec -f`. The profile file lives until the command finishes.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::sandbox::{SandboxPolicy, seatbelt::compile_profile};

use super::run::{RunBounds, SpawnSpec, run_bounded};
use super::{BackendKind, ExecBackend, ExecError, ExecRequest, ExecResult, split_argv};

pub const DEFAULT_SANDBOX_EXEC: &str = "/usr/bin/sandbox-exec";

#[derive(Debug)]
pub struct SeatbeltBackend {
    sandbox_exec: PathBuf,
    policy: SandboxPolicy,
}

impl SeatbeltBackend {
    pub fn new(policy: SandboxPolicy) -> Self {
        Self {
            sandbox_exec: PathBuf::from(DEFAULT_SANDBOX_EXEC),
            policy,
        }
    }

    pub fn with_sandbox_exec(mut self, path: impl Into<PathBuf>) -> Self {
        self.sandbox_exec = path.into();
        self
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }
}

#[async_trait]
impl ExecBackend for SeatbeltBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Seatbelt
    }

    fn check_available(&self) -> Result<(), ExecError> {
        if !cfg!(target_os = "macos") {
            return Err(ExecError::UnsupportedPlatform {
                backend: BackendKind::Seatbelt,
                reason: "seatbelt profiles require macOS".to_string(),
            });
        }
        if !self.sandbox_exec.exists() {
            return Err(ExecError::UnsupportedPlatform {
                backend: BackendKind::Seatbelt,
                reason: format!(
                    "sandbox-exec not found at {}",
                    self.sandbox_exec.display()
                ),
            });
        }
        Ok(())
    }

    async fn run(&self, request: &ExecRequest) -> Result<ExecResult, ExecError> {
        self.check_available()?;
        split_argv(&request.cmd)?;

        let profile = compile_profile(&self.policy);
        let profile_file = tempfile::Builder::new()
            .prefix("toolgate-seatbelt-")
            .suffix(".sb")
            .tempfile()
            .map_err(ExecError::SpawnFailed)?;
        std::fs::write(profile_file.path(), &profile).map_err(ExecError::SpawnFailed)?;
        debug!(profile_path = %profile_file.path().display(), "compiled seatbelt profile");

        let mut args = vec![
            "-f".to_string(),
            profile_file.path().to_string_lossy().into_owned(),
        ];
        args.extend(request.cmd.iter().cloned());

        let result = run_bounded(
            SpawnSpec {
                program: self.sandbox_exec.to_string_lossy().into_owned(),
                args,
                cwd: request.cwd.clone(),
                env: request.env.clone(),
            },
            RunBounds {
                max_bytes: request.max_bytes,
                timeout: request.timeout(),
            },
        )
        .await;
        // Keep the profile file alive until the child is done with it.
        drop(profile_file);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_off_macos() {
        let backend = SeatbeltBackend::new(SandboxPolicy::read_only());
        if cfg!(target_os = "macos") {
            // Only the binary check can fail here.
            let _ = backend.check_available();
        } else {
            assert!(matches!(
                backend.check_available().unwrap_err(),
                ExecError::UnsupportedPlatform { .. }
            ));
        }
    }

    #[tokio::test]
    async fn run_fails_fast_when_unavailable() {
        let backend =
            SeatbeltBackend::new(SandboxPolicy::read_only()).with_sandbox_exec("/nonexistent");
        let err = backend
            .run(&ExecRequest::new(["/bin/echo", "hi"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::UnsupportedPlatform { .. }));
    }
}
