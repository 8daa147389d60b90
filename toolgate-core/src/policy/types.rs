//! Policy request/response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tool call as seen by the decision function. Immutable, constructed
/// per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRequest {
    /// Qualified tool name (`{prefix}__{tool}`).
    pub name: String,
    /// JSON-encoded arguments, absent when the call carried none.
    #[serde(default)]
    pub arguments_json: Option<String>,
}

impl PolicyRequest {
    pub fn new(name: impl Into<String>, arguments_json: Option<String>) -> Self {
        Self {
            name: name.into(),
            arguments_json,
        }
    }

    /// Build the request for a dispatch. Null arguments count as absent.
    pub fn for_call(name: &str, args: &Value) -> Self {
        let arguments_json = if args.is_null() {
            None
        } else {
            Some(args.to_string())
        };
        Self {
            name: name.to_string(),
            arguments_json,
        }
    }
}

/// What the decision function decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Dispatch immediately.
    Allow,
    /// Suspend and wait for an external decider.
    Ask,
    /// Fail immediately; no dispatch, no retry.
    DenyAbort,
}

/// Decision plus the operator-readable reason. Produced once per request,
/// never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResponse {
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub rationale: String,
}

impl PolicyResponse {
    pub fn new(decision: ApprovalDecision, rationale: impl Into<String>) -> Self {
        Self {
            decision,
            rationale: rationale.into(),
        }
    }
}
