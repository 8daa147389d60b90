//! Namespace-sandboxed execution backend built on bubblewrap (Linux only).
//!
//! The sandbox is assembled from a bind-mount plan: a minimal read-only
//! view of the host plus explicitly writable roots, a fresh /proc and /dev,
//! a tmpfs /tmp, and all namespaces unshared (network optionally shared).
//! On non-Linux hosts, or when the `bwrap` binary is missing, the backend
//! reports [`ExecError::UnsupportedPlatform`] instead of degrading.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::run::{RunBounds, SpawnSpec, run_bounded};
use super::{BackendKind, ExecBackend, ExecError, ExecRequest, ExecResult, split_argv};

/// Default read-only system paths bound into the sandbox when they exist on
/// the host.
const DEFAULT_RO_BINDS: &[&str] = &["/usr", "/bin", "/sbin", "/lib", "/lib64", "/etc"];

/// One host path mapped into the sandbox.
#[derive(Debug, Clone)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: PathBuf,
    pub writable: bool,
}

impl BindMount {
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            source: path.clone(),
            target: path,
            writable: false,
        }
    }

    pub fn writable(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            source: path.clone(),
            target: path,
            writable: true,
        }
    }
}

#[derive(Debug)]
pub struct BubblewrapBackend {
    bwrap_path: PathBuf,
    binds: Vec<BindMount>,
    share_net: bool,
}

impl BubblewrapBackend {
    /// Backend with the standard read-only system view and no network.
    pub fn new(bwrap_path: impl Into<PathBuf>) -> Self {
        let binds = DEFAULT_RO_BINDS
            .iter()
            .filter(|path| Path::new(path).exists())
            .map(BindMount::read_only)
            .collect();
        Self {
            bwrap_path: bwrap_path.into(),
            binds,
            share_net: false,
        }
    }

    pub fn with_bind(mut self, bind: BindMount) -> Self {
        self.binds.push(bind);
        self
    }

    pub fn with_binds(mut self, binds: impl IntoIterator<Item = BindMount>) -> Self {
        self.binds.extend(binds);
        self
    }

    pub fn share_net(mut self, share: bool) -> Self {
        self.share_net = share;
        self
    }

    /// Assemble the bwrap argv for one request. Pure; covered by unit tests.
    fn build_args(&self, request: &ExecRequest) -> Vec<String> {
        let mut args: Vec<String> = vec!["--die-with-parent".into(), "--unshare-all".into()];
        if self.share_net {
            args.push("--share-net".into());
        }
        args.push("--proc".into());
        args.push("/proc".into());
        args.push("--dev".into());
        args.push("/dev".into());
        args.push("--tmpfs".into());
        args.push("/tmp".into());
        // Binds come after the tmpfs so an explicit bind under /tmp wins.
        for bind in &self.binds {
            let flag = if bind.writable { "--bind" } else { "--ro-bind" };
            args.push(flag.into());
            args.push(bind.source.to_string_lossy().into_owned());
            args.push(bind.target.to_string_lossy().into_owned());
        }
        args.push("--chdir".into());
        match &request.cwd {
            Some(cwd) => args.push(cwd.to_string_lossy().into_owned()),
            None => args.push("/".into()),
        }
        args.push("--".into());
        args.extend(request.cmd.iter().cloned());
        args
    }
}

#[async_trait]
impl ExecBackend for BubblewrapBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Bubblewrap
    }

    fn check_available(&self) -> Result<(), ExecError> {
        if !cfg!(target_os = "linux") {
            return Err(ExecError::UnsupportedPlatform {
                backend: BackendKind::Bubblewrap,
                reason: "user namespace sandboxing requires Linux".to_string(),
            });
        }
        if !self.bwrap_path.exists() {
            return Err(ExecError::UnsupportedPlatform {
                backend: BackendKind::Bubblewrap,
                reason: format!("bwrap binary not found at {}", self.bwrap_path.display()),
            });
        }
        Ok(())
    }

    async fn run(&self, request: &ExecRequest) -> Result<ExecResult, ExecError> {
        self.check_available()?;
        split_argv(&request.cmd)?;
        run_bounded(
            SpawnSpec {
                program: self.bwrap_path.to_string_lossy().into_owned(),
                args: self.build_args(request),
                // bwrap handles the working directory via --chdir.
                cwd: None,
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

    fn backend_with_fixed_binds() -> BubblewrapBackend {
        BubblewrapBackend {
            bwrap_path: PathBuf::from("/usr/bin/bwrap"),
            binds: vec![
                BindMount::read_only("/usr"),
                BindMount::writable("/workspace"),
            ],
            share_net: false,
        }
    }

    #[test]
    fn argv_isolates_by_default() {
        let backend = backend_with_fixed_binds();
        let args = backend.build_args(&ExecRequest::new(["echo", "hi"]));
        assert_eq!(args[0], "--die-with-parent");
        assert_eq!(args[1], "--unshare-all");
        assert!(!args.contains(&"--share-net".to_string()));
        assert!(args.windows(3).any(|w| w == ["--ro-bind", "/usr", "/usr"]));
        assert!(args
            .windows(3)
            .any(|w| w == ["--bind", "/workspace", "/workspace"]));
        let tail: Vec<_> = args.iter().rev().take(3).rev().cloned().collect();
        assert_eq!(tail, ["--", "echo", "hi"]);
    }

    #[test]
    fn argv_shares_network_when_asked() {
        let backend = backend_with_fixed_binds().share_net(true);
        let args = backend.build_args(&ExecRequest::new(["true"]));
        assert!(args.contains(&"--share-net".to_string()));
    }

    #[test]
    fn argv_uses_request_cwd() {
        let backend = backend_with_fixed_binds();
        let args = backend.build_args(&ExecRequest::new(["true"]).cwd("/workspace"));
        assert!(args.windows(2).any(|w| w == ["--chdir", "/workspace"]));
    }

    #[test]
    fn missing_binary_is_unsupported() {
        let backend = BubblewrapBackend::new("/nonexistent/bwrap");
        let err = backend.check_available().unwrap_err();
        if cfg!(target_os = "linux") {
            assert!(matches!(err, ExecError::UnsupportedPlatform { reason, .. }
                if reason.contains("bwrap binary not found")));
        } else {
            assert!(matches!(err, ExecError::UnsupportedPlatform { .. }));
        }
    }
}
