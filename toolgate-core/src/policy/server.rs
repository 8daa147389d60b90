//! Policy engine tool surfaces.
//!
//! One engine, three mountable backends with different blast radii: the
//! reader exposes inspection and evaluation, the proposer lets a
//! supervised agent suggest policy changes, and the admin surface decides
//! pending calls and proposals. Mount placement decides which surfaces an
//! agent can reach; `set_policy` in particular belongs on trusted mounts
//! only.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::backend::{ToolBackend, ToolSpec};

use super::engine::{PolicyEngine, ProposalDecision};
use super::hub::CallResolution;
use super::types::PolicyRequest;

fn string_schema(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

// ---- reader ----

/// Inspection and evaluation surface.
pub struct PolicyReaderBackend {
    engine: Arc<PolicyEngine>,
}

impl PolicyReaderBackend {
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self { engine }
    }
}

#[derive(Debug, Deserialize)]
struct EvaluatePolicyArgs {
    name: String,
    #[serde(default)]
    arguments_json: Option<String>,
}

#[async_trait]
impl ToolBackend for PolicyReaderBackend {
    fn tools(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new(
                "active_policy",
                "Return the active policy document text, if any",
                json!({"type": "object", "properties": {}}),
            ),
            ToolSpec::new(
                "pending_calls",
                "List tool calls suspended awaiting approval",
                json!({"type": "object", "properties": {}}),
            ),
            ToolSpec::new(
                "proposals",
                "List policy proposals and their status",
                json!({"type": "object", "properties": {}}),
            ),
            ToolSpec::new(
                "evaluate_policy",
                "Evaluate the active decision function for one hypothetical call",
                json!({
                    "type": "object",
                    "properties": {
                        "name": string_schema("Qualified tool name"),
                        "arguments_json": string_schema("JSON-encoded arguments, if any")
                    },
                    "required": ["name"]
                }),
            ),
        ]
    }

    async fn call_tool(&self, tool: &str, args: Value) -> Result<Value> {
        match tool {
            "active_policy" => Ok(json!({
                "active": self.engine.has_active_policy(),
                "content": self.engine.active_policy_text(),
            })),
            "pending_calls" => Ok(json!({"pending": self.engine.hub().pending()})),
            "proposals" => Ok(json!({"proposals": self.engine.proposals().await})),
            "evaluate_policy" => {
                let input: EvaluatePolicyArgs =
                    serde_json::from_value(args).context("invalid evaluate_policy arguments")?;
                let request = PolicyRequest::new(input.name, input.arguments_json);
                let response = self.engine.evaluate(&request).await;
                Ok(serde_json::to_value(response)?)
            }
            other => bail!("unknown tool '{other}'"),
        }
    }
}

// ---- proposer ----

/// Proposal surface for the supervised agent. The actor identity is fixed
/// at mount time and recorded on every proposal, so the engine can refuse
/// self-approval later.
pub struct PolicyProposerBackend {
    engine: Arc<PolicyEngine>,
    actor: String,
}

impl PolicyProposerBackend {
    pub fn new(engine: Arc<PolicyEngine>, actor: impl Into<String>) -> Self {
        Self {
            engine,
            actor: actor.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateProposalArgs {
    content: String,
}

#[derive(Debug, Deserialize)]
struct WithdrawProposalArgs {
    id: String,
}

#[async_trait]
impl ToolBackend for PolicyProposerBackend {
    fn tools(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new(
                "create_proposal",
                "Propose a replacement policy document; it is validated and \
                 queued for an operator decision",
                json!({
                    "type": "object",
                    "properties": {
                        "content": string_schema("Policy document (TOML: script + embedded tests)")
                    },
                    "required": ["content"]
                }),
            ),
            ToolSpec::new(
                "withdraw_proposal",
                "Withdraw one of this agent's pending proposals",
                json!({
                    "type": "object",
                    "properties": {"id": string_schema("Proposal id")},
                    "required": ["id"]
                }),
            ),
        ]
    }

    async fn call_tool(&self, tool: &str, args: Value) -> Result<Value> {
        match tool {
            "create_proposal" => {
                let input: CreateProposalArgs =
                    serde_json::from_value(args).context("invalid create_proposal arguments")?;
                let proposal = self
                    .engine
                    .create_proposal(&input.content, &self.actor)
                    .await?;
                Ok(serde_json::to_value(proposal)?)
            }
            "withdraw_proposal" => {
                let input: WithdrawProposalArgs =
                    serde_json::from_value(args).context("invalid withdraw_proposal arguments")?;
                self.engine.withdraw_proposal(&input.id).await?;
                Ok(json!({"withdrawn": input.id}))
            }
            other => bail!("unknown tool '{other}'"),
        }
    }
}

// ---- admin ----

/// Privileged decision surface. Never mount this where the supervised
/// agent can reach it.
pub struct PolicyAdminBackend {
    engine: Arc<PolicyEngine>,
    actor: String,
}

impl PolicyAdminBackend {
    pub fn new(engine: Arc<PolicyEngine>, actor: impl Into<String>) -> Self {
        Self {
            engine,
            actor: actor.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CallDecisionArg {
    Approve,
    Deny,
}

#[derive(Debug, Deserialize)]
struct DecideCallArgs {
    call_id: String,
    decision: CallDecisionArg,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DecideProposalArgs {
    id: String,
    decision: ProposalDecision,
}

#[derive(Debug, Deserialize)]
struct SetPolicyArgs {
    content: String,
}

#[async_trait]
impl ToolBackend for PolicyAdminBackend {
    fn tools(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new(
                "decide_call",
                "Approve or deny a tool call suspended awaiting approval",
                json!({
                    "type": "object",
                    "properties": {
                        "call_id": string_schema("Pending call id"),
                        "decision": {"type": "string", "enum": ["approve", "deny"]},
                        "reason": string_schema("Reason shown to the caller on denial")
                    },
                    "required": ["call_id", "decision"]
                }),
            ),
            ToolSpec::new(
                "decide_proposal",
                "Approve or reject a policy proposal; approval activates it",
                json!({
                    "type": "object",
                    "properties": {
                        "id": string_schema("Proposal id"),
                        "decision": {"type": "string", "enum": ["approve", "reject"]}
                    },
                    "required": ["id", "decision"]
                }),
            ),
            ToolSpec::new(
                "set_policy",
                "Directly activate a policy document after self-check (trusted path)",
                json!({
                    "type": "object",
                    "properties": {
                        "content": string_schema("Policy document (TOML: script + embedded tests)")
                    },
                    "required": ["content"]
                }),
            ),
        ]
    }

    async fn call_tool(&self, tool: &str, args: Value) -> Result<Value> {
        match tool {
            "decide_call" => {
                let input: DecideCallArgs =
                    serde_json::from_value(args).context("invalid decide_call arguments")?;
                let resolution = match input.decision {
                    CallDecisionArg::Approve => CallResolution::Approved,
                    CallDecisionArg::Deny => CallResolution::Denied {
                        reason: input
                            .reason
                            .unwrap_or_else(|| "denied by operator".to_string()),
                    },
                };
                let resolved = self.engine.hub().resolve(&input.call_id, resolution);
                Ok(json!({"resolved": resolved}))
            }
            "decide_proposal" => {
                let input: DecideProposalArgs =
                    serde_json::from_value(args).context("invalid decide_proposal arguments")?;
                let proposal = self
                    .engine
                    .decide_proposal(&input.id, input.decision, &self.actor)
                    .await?;
                Ok(serde_json::to_value(proposal)?)
            }
            "set_policy" => {
                let input: SetPolicyArgs =
                    serde_json::from_value(args).context("invalid set_policy arguments")?;
                let report = self.engine.set_policy_text(&input.content).await?;
                Ok(json!({"test_report": report}))
            }
            other => bail!("unknown tool '{other}'"),
        }
    }
}
