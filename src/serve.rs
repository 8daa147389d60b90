//! The stdio debug transport.
//!
//! Assembles the gateway from configuration and serves line-delimited JSON
//! on stdio: each request line is `{"id": ..., "name": "prefix__tool",
//! "arguments": {...}}`, each response line is `{"id": ..., "ok": ...}` or
//! `{"id": ..., "error": {"kind": ..., "message": ...}}`. Mount lifecycle
//! events are interleaved as `{"event": ...}` lines. Every request is
//! served by its own task, so a call suspended on approval never blocks
//! the loop; the operator can keep issuing `policy_admin__decide_call`.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use toolgate_core::backend::ToolBackend;
use toolgate_core::compositor::{Compositor, CompositorMetaBackend, MountOptions, MountPrefix};
use toolgate_core::exec::{ExecBackend, ExecToolBackend};
use toolgate_core::policy::{
    PolicyAdminBackend, PolicyEngine, PolicyGateway, PolicyProposerBackend, PolicyReaderBackend,
    ScriptEvaluator,
};

use crate::commands::{build_evaluator_backend, load_config};

/// Actor identity stamped on proposals created over this transport.
const AGENT_ACTOR: &str = "agent";
/// Actor identity for admin decisions over this transport.
const OPERATOR_ACTOR: &str = "operator";

#[derive(Debug, Deserialize)]
struct RequestLine {
    #[serde(default)]
    id: Option<Value>,
    name: String,
    #[serde(default)]
    arguments: Value,
}

pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    // Policy engine over a sandboxed script evaluator.
    let evaluator = Arc::new(ScriptEvaluator::new(
        build_evaluator_backend(&config),
        config.engine_config().eval_timeout,
    ));
    let engine = Arc::new(PolicyEngine::new(evaluator, config.engine_config()));
    if let Some(path) = &config.policy.path {
        engine.load_policy_file(path).await?;
    } else {
        warn!("no bootstrap policy configured; every gated call will ask for approval");
    }

    // Compositor gated by the engine.
    let gateway = Arc::new(PolicyGateway::new(Arc::clone(&engine)));
    let compositor = Arc::new(Compositor::with_gate(gateway));

    // Runtime mount: the configured exec backend as a gated tool.
    let exec_backend: Arc<dyn ExecBackend> = config.build_exec_backend();
    if let Err(err) = exec_backend.check_available() {
        warn!(%err, "configured exec backend is unavailable; runtime calls will fail");
    }
    compositor
        .mount(
            MountPrefix::new("runtime")?,
            Arc::new(ExecToolBackend::new(exec_backend, config.exec_limits())),
            MountOptions::default(),
        )
        .await?;

    // The compositor's own admin surface, policy-gated like any other
    // tool so reconfiguration is auditable and deniable.
    compositor
        .mount(
            MountPrefix::new("gateway")?,
            Arc::new(CompositorMetaBackend::new(&compositor)),
            MountOptions::default().pinned(true),
        )
        .await?;

    // Policy surfaces. The reader and admin are operator infrastructure on
    // this transport: pinned and ungated (gating the reader through the
    // policy it reads would recurse). The proposer is the agent-facing
    // surface and goes through the gate like any other tool.
    compositor
        .mount(
            MountPrefix::new("policy")?,
            Arc::new(PolicyReaderBackend::new(Arc::clone(&engine))) as Arc<dyn ToolBackend>,
            MountOptions::trusted().pinned(true),
        )
        .await?;
    compositor
        .mount(
            MountPrefix::new("policy_proposer")?,
            Arc::new(PolicyProposerBackend::new(Arc::clone(&engine), AGENT_ACTOR)),
            MountOptions::default(),
        )
        .await?;
    compositor
        .mount(
            MountPrefix::new("policy_admin")?,
            Arc::new(PolicyAdminBackend::new(Arc::clone(&engine), OPERATOR_ACTOR)),
            MountOptions::trusted().pinned(true),
        )
        .await?;

    // Forward lifecycle events to observers.
    let mut events = compositor.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("{}", json!({"event": event}));
        }
    });

    info!("gateway ready; reading requests from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let request: RequestLine = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                println!(
                    "{}",
                    json!({"error": {"kind": "bad_request", "message": err.to_string()}})
                );
                continue;
            }
        };

        let compositor = Arc::clone(&compositor);
        tokio::spawn(async move {
            let id = request.id.unwrap_or(Value::Null);
            match compositor.dispatch(&request.name, request.arguments).await {
                Ok(result) => println!("{}", json!({"id": id, "ok": result})),
                Err(err) => println!(
                    "{}",
                    json!({
                        "id": id,
                        "error": {"kind": err.kind(), "message": err.to_string()}
                    })
                ),
            }
        });
    }

    info!("stdin closed; shutting down");
    Ok(())
}
