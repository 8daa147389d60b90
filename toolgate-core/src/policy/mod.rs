//! Approval policy engine.
//!
//! Every sensitive tool call is gated through a single, swappable decision
//! function: a script carried in a [`PolicyDocument`], executed in
//! isolation through the sandboxed execution layer, and replaced only via
//! a test-gated propose/approve workflow so the supervised agent can never
//! silently rewrite its own guardrails.

mod document;
mod engine;
mod evaluator;
mod gateway;
mod hub;
mod server;
mod types;

pub use document::{
    PolicyDocument, PolicyError, PolicyTestCase, TestCaseResult, TestOutcome, TestReport,
};
pub use engine::{
    EngineConfig, PolicyEngine, Proposal, ProposalDecision, ProposalError, ProposalStatus,
};
pub use evaluator::{EvaluationError, PolicyEvaluator, ScriptEvaluator};
pub use gateway::PolicyGateway;
pub use hub::{ApprovalHub, ApprovalTicket, CallResolution, PendingCall};
pub use server::{PolicyAdminBackend, PolicyProposerBackend, PolicyReaderBackend};
pub use types::{ApprovalDecision, PolicyRequest, PolicyResponse};
