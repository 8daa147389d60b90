//! One-shot operator subcommands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use toolgate_core::config::GatewayConfig;
use toolgate_core::exec::{BackendKind, BindMount, BubblewrapBackend, DirectBackend, ExecBackend, ExecRequest, ExitDisposition};
use toolgate_core::policy::{PolicyDocument, PolicyEngine, ScriptEvaluator};

use crate::cli::{CheckPolicyArgs, ExecArgs};

/// Load the config, falling back to defaults when the default file is
/// simply absent.
pub fn load_config(path: &Path) -> Result<GatewayConfig> {
    if path.exists() {
        Ok(GatewayConfig::load(path)?)
    } else {
        warn!(path = %path.display(), "config file not found; using defaults");
        Ok(GatewayConfig::default())
    }
}

/// Pick the backend that runs untrusted policy scripts.
///
/// Reuses the configured isolation where the staged script file is visible
/// inside the sandbox. The container backend cannot see host temp files,
/// so policy evaluation falls back to bubblewrap when present and to
/// direct execution (with a warning) otherwise.
pub fn build_evaluator_backend(config: &GatewayConfig) -> Arc<dyn ExecBackend> {
    match config.exec.backend {
        BackendKind::Container => {
            let bwrap = BubblewrapBackend::new(&config.exec.bubblewrap.bwrap_path)
                .with_bind(BindMount::read_only(std::env::temp_dir()));
            if bwrap.check_available().is_ok() {
                Arc::new(bwrap)
            } else {
                warn!("no host sandbox available for policy evaluation; running scripts directly");
                Arc::new(DirectBackend::new())
            }
        }
        BackendKind::Bubblewrap => Arc::new(
            BubblewrapBackend::new(&config.exec.bubblewrap.bwrap_path)
                .with_bind(BindMount::read_only(std::env::temp_dir())),
        ),
        _ => config.build_exec_backend(),
    }
}

pub async fn exec(config_path: &Path, args: ExecArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let limits = config.exec_limits();
    let backend = config.build_exec_backend();
    backend.check_available()?;

    let mut request = ExecRequest::new(args.cmd)
        .max_bytes(args.max_bytes.unwrap_or(limits.max_bytes).min(limits.max_bytes))
        .timeout_ms(args.timeout_ms.unwrap_or(limits.timeout_ms).min(limits.timeout_ms));
    if let Some(cwd) = args.cwd {
        request = request.cwd(cwd);
    }

    let result = backend.run(&request).await?;
    print!("{}", result.stdout_lossy());
    eprint!("{}", result.stderr_lossy());

    match result.exit {
        ExitDisposition::Exited { code } => std::process::exit(code),
        ExitDisposition::TimedOut => {
            eprintln!("toolgate: command timed out after {}ms", request.timeout_ms);
            std::process::exit(124);
        }
        ExitDisposition::OutputTruncated => {
            eprintln!(
                "toolgate: output exceeded {} bytes; command terminated",
                request.max_bytes
            );
            std::process::exit(125);
        }
    }
}

pub async fn check_policy(config_path: &Path, args: CheckPolicyArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("cannot read {}", args.file.display()))?;
    let document = PolicyDocument::parse(&text)?;

    let evaluator = Arc::new(ScriptEvaluator::new(
        build_evaluator_backend(&config),
        config.engine_config().eval_timeout,
    ));
    let engine = PolicyEngine::new(evaluator, config.engine_config());
    let report = engine.run_document_tests(&document).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.passed() {
        eprintln!(
            "toolgate: {} of {} cases passed",
            document.tests.len(),
            document.tests.len()
        );
        Ok(())
    } else {
        eprintln!("toolgate: {}", report.summary());
        std::process::exit(1);
    }
}
