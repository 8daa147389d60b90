//! Gateway configuration.
//!
//! Everything is driven by `toolgate.toml`. Every field has a default, so
//! an empty file (or no file) yields a working direct-backend gateway;
//! sections override selectively:
//!
//! ```toml
//! [gateway]
//! approval_timeout_ms = 120000
//! eval_timeout_ms = 5000
//!
//! [policy]
//! path = "policy.toml"
//!
//! [exec]
//! backend = "bubblewrap"
//! max_bytes = 131072
//! timeout_ms = 30000
//!
//! [exec.bubblewrap]
//! bwrap_path = "/usr/bin/bwrap"
//! writable = ["/workspace"]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::{
    BackendKind, BindMount, BubblewrapBackend, ContainerBackend, DirectBackend, ExecBackend,
    ExecLimits, SeatbeltBackend,
};
use crate::policy::EngineConfig;
use crate::sandbox::SandboxPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

fn default_approval_timeout_ms() -> u64 {
    120_000
}

fn default_eval_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewaySection {
    pub approval_timeout_ms: u64,
    pub eval_timeout_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            approval_timeout_ms: default_approval_timeout_ms(),
            eval_timeout_ms: default_eval_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicySection {
    /// Trusted policy document loaded at startup. None starts the engine
    /// with no active policy (everything resolves to ASK).
    pub path: Option<PathBuf>,
}

fn default_exec_max_bytes() -> usize {
    crate::exec::DEFAULT_MAX_BYTES
}

fn default_exec_timeout_ms() -> u64 {
    crate::exec::DEFAULT_TIMEOUT_MS
}

fn default_backend_kind() -> BackendKind {
    BackendKind::Direct
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecSection {
    /// Which isolation strategy the runtime mount uses.
    pub backend: BackendKind,
    /// Cap on captured output per call.
    pub max_bytes: usize,
    /// Cap on wall-clock time per call.
    pub timeout_ms: u64,
    pub bubblewrap: BubblewrapSection,
    pub seatbelt: SeatbeltSection,
    pub container: ContainerSection,
}

impl Default for ExecSection {
    fn default() -> Self {
        Self {
            backend: default_backend_kind(),
            max_bytes: default_exec_max_bytes(),
            timeout_ms: default_exec_timeout_ms(),
            bubblewrap: BubblewrapSection::default(),
            seatbelt: SeatbeltSection::default(),
            container: ContainerSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BubblewrapSection {
    pub bwrap_path: PathBuf,
    /// Host paths bound writable into the sandbox.
    pub writable: Vec<PathBuf>,
    pub share_net: bool,
}

impl Default for BubblewrapSection {
    fn default() -> Self {
        Self {
            bwrap_path: PathBuf::from("/usr/bin/bwrap"),
            writable: Vec::new(),
            share_net: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeatbeltSection {
    pub sandbox_exec: PathBuf,
    /// Roots the compiled profile grants write access to.
    pub writable_roots: Vec<PathBuf>,
}

impl Default for SeatbeltSection {
    fn default() -> Self {
        Self {
            sandbox_exec: PathBuf::from(crate::exec::DEFAULT_SANDBOX_EXEC),
            writable_roots: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerSection {
    pub image: String,
    pub docker_bin: String,
    pub network: String,
    pub workdir: Option<String>,
}

impl Default for ContainerSection {
    fn default() -> Self {
        Self {
            image: "ubuntu:24.04".to_string(),
            docker_bin: "docker".to_string(),
            network: "none".to_string(),
            workdir: None,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub gateway: GatewaySection,
    pub policy: PolicySection,
    pub exec: ExecSection,
}

impl GatewayConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            eval_timeout: Duration::from_millis(self.gateway.eval_timeout_ms),
            approval_timeout: Duration::from_millis(self.gateway.approval_timeout_ms),
        }
    }

    pub fn exec_limits(&self) -> ExecLimits {
        ExecLimits {
            max_bytes: self.exec.max_bytes,
            timeout_ms: self.exec.timeout_ms,
        }
    }

    /// Construct the configured exec backend. Availability is not checked
    /// here; callers decide whether to fail fast.
    pub fn build_exec_backend(&self) -> Arc<dyn ExecBackend> {
        match self.exec.backend {
            BackendKind::Direct => Arc::new(DirectBackend::new()),
            BackendKind::Bubblewrap => {
                let section = &self.exec.bubblewrap;
                let backend = BubblewrapBackend::new(&section.bwrap_path)
                    .with_binds(section.writable.iter().map(BindMount::writable))
                    .share_net(section.share_net);
                Arc::new(backend)
            }
            BackendKind::Seatbelt => {
                let section = &self.exec.seatbelt;
                let policy = SandboxPolicy::workspace(&section.writable_roots);
                Arc::new(SeatbeltBackend::new(policy).with_sandbox_exec(&section.sandbox_exec))
            }
            BackendKind::Container => {
                let section = &self.exec.container;
                let mut backend = ContainerBackend::new(&section.image)
                    .with_docker_bin(&section.docker_bin)
                    .with_network(&section.network);
                if let Some(workdir) = &section.workdir {
                    backend = backend.with_workdir(workdir);
                }
                Arc::new(backend)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.gateway.approval_timeout_ms, 120_000);
        assert_eq!(config.gateway.eval_timeout_ms, 5_000);
        assert_eq!(config.exec.backend, BackendKind::Direct);
        assert_eq!(config.exec.max_bytes, crate::exec::DEFAULT_MAX_BYTES);
        assert!(config.policy.path.is_none());
    }

    #[test]
    fn sections_override_selectively() {
        let config: GatewayConfig = toml::from_str(
            r#"
[gateway]
approval_timeout_ms = 1000

[policy]
path = "policy.toml"

[exec]
backend = "container"

[exec.container]
image = "alpine:3.20"
"#,
        )
        .unwrap();
        assert_eq!(config.gateway.approval_timeout_ms, 1_000);
        assert_eq!(config.gateway.eval_timeout_ms, 5_000);
        assert_eq!(config.exec.backend, BackendKind::Container);
        assert_eq!(config.exec.container.image, "alpine:3.20");
        assert_eq!(config.exec.container.network, "none");
        assert_eq!(config.policy.path.as_deref(), Some(Path::new("policy.toml")));
    }

    #[test]
    fn unknown_backend_kind_fails_parse() {
        let err = toml::from_str::<GatewayConfig>("[exec]\nbackend = \"chroot\"").unwrap_err();
        assert!(err.to_string().contains("unknown variant"));
    }

    #[test]
    fn unknown_keys_fail_parse() {
        assert!(toml::from_str::<GatewayConfig>("[gateway]\nmystery = 1").is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = GatewayConfig::load(Path::new("/nonexistent/toolgate.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_round_trips_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toolgate.toml");
        std::fs::write(&path, "[exec]\ntimeout_ms = 9000\n").unwrap();
        let config = GatewayConfig::load(&path).unwrap();
        assert_eq!(config.exec.timeout_ms, 9_000);
        assert_eq!(config.exec_limits().timeout_ms, 9_000);
    }
}
