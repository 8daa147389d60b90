//! Containerized execution backend driving the container CLI.
//!
//! Each request runs in a fresh `docker run --rm` container from the
//! configured image, named so it can be killed by name. Output and timeout
//! bounds are enforced at this layer (the CLI process is bounded exactly
//! like any other backend) and never delegated to the runtime's own
//! limits, which vary. When a bound fires, the container itself is also
//! killed (best-effort) since killing the CLI client does not stop it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use super::run::{RunBounds, SpawnSpec, run_bounded};
use super::{BackendKind, ExecBackend, ExecError, ExecRequest, ExecResult, ExitDisposition, split_argv};

/// How long to wait for the best-effort container kill.
const CONTAINER_KILL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ContainerBackend {
    docker_bin: String,
    image: String,
    network: String,
    workdir: Option<String>,
}

impl ContainerBackend {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            docker_bin: "docker".to_string(),
            image: image.into(),
            network: "none".to_string(),
            workdir: None,
        }
    }

    /// Use another CLI-compatible runtime binary (e.g. podman).
    pub fn with_docker_bin(mut self, docker_bin: impl Into<String>) -> Self {
        self.docker_bin = docker_bin.into();
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    fn container_name(&self) -> String {
        format!("toolgate-{}", Uuid::new_v4().simple())
    }

    /// Assemble the `docker run` argv. Pure; covered by unit tests.
    fn build_args(&self, name: &str, request: &ExecRequest) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "--rm".into(),
            "--name".into(),
            name.into(),
            "--network".into(),
            self.network.clone(),
        ];
        let workdir = request
            .cwd
            .as_ref()
            .map(|cwd| cwd.to_string_lossy().into_owned())
            .or_else(|| self.workdir.clone());
        if let Some(workdir) = workdir {
            args.push("--workdir".into());
            args.push(workdir);
        }
        for (key, value) in &request.env {
            args.push("--env".into());
            args.push(format!("{key}={value}"));
        }
        args.push(self.image.clone());
        args.extend(request.cmd.iter().cloned());
        args
    }

    /// Best-effort kill of the named container after a bound fired.
    async fn kill_container(&self, name: &str) {
        let result = tokio::time::timeout(
            CONTAINER_KILL_TIMEOUT,
            tokio::process::Command::new(&self.docker_bin)
                .args(["kill", name])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status(),
        )
        .await;
        match result {
            Ok(Ok(status)) if status.success() => {
                debug!(container = name, "killed container after bound fired");
            }
            Ok(Ok(_)) => {
                // Usually the container already exited with --rm.
                debug!(container = name, "container kill reported failure");
            }
            Ok(Err(err)) => warn!(container = name, %err, "failed to invoke container kill"),
            Err(_) => warn!(container = name, "container kill timed out"),
        }
    }
}

fn binary_on_path(binary: &str) -> bool {
    let candidate = Path::new(binary);
    if candidate.is_absolute() {
        return candidate.exists();
    }
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir: PathBuf| dir.join(binary).is_file())
        })
        .unwrap_or(false)
}

#[async_trait]
impl ExecBackend for ContainerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Container
    }

    fn check_available(&self) -> Result<(), ExecError> {
        if !binary_on_path(&self.docker_bin) {
            return Err(ExecError::UnsupportedPlatform {
                backend: BackendKind::Container,
                reason: format!("container runtime '{}' not found", self.docker_bin),
            });
        }
        Ok(())
    }

    async fn run(&self, request: &ExecRequest) -> Result<ExecResult, ExecError> {
        self.check_available()?;
        split_argv(&request.cmd)?;

        let name = self.container_name();
        let spec = SpawnSpec {
            program: self.docker_bin.clone(),
            args: self.build_args(&name, request),
            cwd: None,
            // Request env goes to the container via --env, not to the CLI.
            env: std::collections::BTreeMap::new(),
        };
        let result = run_bounded(
            spec,
            RunBounds {
                max_bytes: request.max_bytes,
                timeout: request.timeout(),
            },
        )
        .await?;

        if matches!(
            result.exit,
            ExitDisposition::TimedOut | ExitDisposition::OutputTruncated
        ) {
            self.kill_container(&name).await;
        }
        Ok(result)
    }
}
