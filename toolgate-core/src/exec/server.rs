//! Adapter exposing an exec backend as a mountable tool provider.
//!
//! Mounted (typically as `runtime`), this gives agents a single `exec` tool
//! whose requests are clamped to the configured caps before they reach the
//! backend, so no caller can talk its way past the bounds.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::backend::{ToolBackend, ToolSpec};

use super::{DEFAULT_MAX_BYTES, DEFAULT_TIMEOUT_MS, ExecBackend, ExecRequest};

pub const EXEC_TOOL_NAME: &str = "exec";

/// Upper bounds applied to every request through the tool surface.
#[derive(Debug, Clone, Copy)]
pub struct ExecLimits {
    pub max_bytes: usize,
    pub timeout_ms: u64,
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExecToolInput {
    cmd: Vec<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    env: Option<BTreeMap<String, String>>,
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    max_bytes: Option<usize>,
}

/// Tool provider wrapping one [`ExecBackend`].
pub struct ExecToolBackend {
    backend: Arc<dyn ExecBackend>,
    limits: ExecLimits,
}

impl ExecToolBackend {
    pub fn new(backend: Arc<dyn ExecBackend>, limits: ExecLimits) -> Self {
        Self { backend, limits }
    }

    fn request_from(&self, input: ExecToolInput) -> ExecRequest {
        let mut request = ExecRequest::new(input.cmd);
        request.max_bytes = input
            .max_bytes
            .unwrap_or(self.limits.max_bytes)
            .min(self.limits.max_bytes);
        request.timeout_ms = input
            .timeout_ms
            .unwrap_or(self.limits.timeout_ms)
            .min(self.limits.timeout_ms);
        request.cwd = input.cwd.map(Into::into);
        request.env = input.env.unwrap_or_default();
        request
    }
}

#[async_trait]
impl ToolBackend for ExecToolBackend {
    fn tools(&self) -> Vec<ToolSpec> {
        vec![ToolSpec::new(
            EXEC_TOOL_NAME,
            format!(
                "Run a command under the {} backend. The cmd array is passed \
                 execve-style with no shell; use [\"sh\", \"-c\", ...] for shell features.",
                self.backend.kind()
            ),
            json!({
                "type": "object",
                "properties": {
                    "cmd": {
                        "type": "array",
                        "items": {"type": "string"},
                        "minItems": 1,
                        "description": "Command argv; no shell interpretation"
                    },
                    "cwd": {"type": "string", "description": "Working directory"},
                    "env": {
                        "type": "object",
                        "additionalProperties": {"type": "string"},
                        "description": "Extra environment variables"
                    },
                    "timeout_ms": {"type": "integer", "minimum": 1},
                    "max_bytes": {"type": "integer", "minimum": 0}
                },
                "required": ["cmd"]
            }),
        )]
    }

    async fn call_tool(&self, tool: &str, args: Value) -> Result<Value> {
        if tool != EXEC_TOOL_NAME {
            bail!("unknown tool '{tool}'");
        }
        let input: ExecToolInput =
            serde_json::from_value(args).context("invalid exec arguments")?;
        if input.cmd.is_empty() {
            bail!("cmd must not be empty");
        }
        let request = self.request_from(input);
        let result = self.backend.run(&request).await?;
        Ok(json!({
            "exit": result.exit,
            "stdout": result.stdout_lossy(),
            "stderr": result.stderr_lossy(),
            "duration_ms": result.duration.as_millis() as u64,
        }))
    }
}
