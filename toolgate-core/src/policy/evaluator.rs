//! Decision-function execution strategies.
//!
//! The engine never runs policy logic in-process. [`PolicyEvaluator`] is
//! the seam; the production implementation, [`ScriptEvaluator`], writes the
//! document's script to a temporary file and runs it through an exec
//! backend (the same sandboxed execution layer that runs agent commands)
//! with the request JSON as the script's argument. The script answers with
//! a response JSON object on its last non-empty stdout line.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::exec::{ExecBackend, ExecRequest, ExitDisposition};

use super::document::PolicyDocument;
use super::types::{PolicyRequest, PolicyResponse};

/// Why an evaluation produced no decision.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// The decision function ran past its bound and was killed.
    #[error("decision function timed out after {0:?}")]
    TimedOut(Duration),
    /// The decision function crashed, overflowed, or answered garbage.
    #[error("decision function failed: {0}")]
    Failed(String),
}

/// Strategy for invoking a document's decision function exactly once.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn decide(
        &self,
        document: &PolicyDocument,
        request: &PolicyRequest,
    ) -> Result<PolicyResponse, EvaluationError>;
}

/// Cap on decision-function output; responses are one JSON line.
const EVAL_MAX_BYTES: usize = 16 * 1024;

/// Runs policy scripts through an exec backend.
pub struct ScriptEvaluator {
    exec: Arc<dyn ExecBackend>,
    timeout: Duration,
}

impl ScriptEvaluator {
    pub fn new(exec: Arc<dyn ExecBackend>, timeout: Duration) -> Self {
        Self { exec, timeout }
    }
}

fn parse_response(stdout: &str) -> Result<PolicyResponse, EvaluationError> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| EvaluationError::Failed("script produced no output".to_string()))?;
    serde_json::from_str(line.trim())
        .map_err(|err| EvaluationError::Failed(format!("unparseable response {line:?}: {err}")))
}

#[async_trait]
impl PolicyEvaluator for ScriptEvaluator {
    async fn decide(
        &self,
        document: &PolicyDocument,
        request: &PolicyRequest,
    ) -> Result<PolicyResponse, EvaluationError> {
        let script_file = tempfile::Builder::new()
            .prefix("toolgate-policy-")
            .suffix(".sh")
            .tempfile()
            .map_err(|err| EvaluationError::Failed(format!("cannot stage script: {err}")))?;
        std::fs::write(script_file.path(), &document.script)
            .map_err(|err| EvaluationError::Failed(format!("cannot stage script: {err}")))?;

        let request_json = serde_json::to_string(request)
            .map_err(|err| EvaluationError::Failed(format!("cannot encode request: {err}")))?;

        let mut cmd = document.interpreter.clone();
        cmd.push(script_file.path().to_string_lossy().into_owned());
        cmd.push(request_json);

        let exec_request = ExecRequest::new(cmd)
            .max_bytes(EVAL_MAX_BYTES)
            .timeout_ms(self.timeout.as_millis() as u64);
        let result = self
            .exec
            .run(&exec_request)
            .await
            .map_err(|err| EvaluationError::Failed(err.to_string()))?;
        // Script staging must outlive the run.
        drop(script_file);

        debug!(name = %request.name, exit = ?result.exit, "policy script finished");
        match result.exit {
            ExitDisposition::TimedOut => Err(EvaluationError::TimedOut(self.timeout)),
            ExitDisposition::OutputTruncated => Err(EvaluationError::Failed(
                "decision function exceeded its output bound".to_string(),
            )),
            ExitDisposition::Exited { code } if code != 0 => Err(EvaluationError::Failed(format!(
                "decision function exited with code {code}: {}",
                result.stderr_lossy().trim()
            ))),
            ExitDisposition::Exited { .. } => parse_response(&result.stdout_lossy()),
        }
    }
}
