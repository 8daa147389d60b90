//! The approval policy engine.
//!
//! Holds the single active policy document, evaluates requests through the
//! configured [`PolicyEvaluator`] with fail-closed error handling, and
//! manages the propose/approve workflow that is the only untrusted path to
//! replacing the active document. The active slot is swapped atomically at
//! approval time; evaluations that already started finish against the
//! document they captured.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::document::{PolicyDocument, PolicyError, TestCaseResult, TestOutcome, TestReport};
use super::evaluator::{EvaluationError, PolicyEvaluator};
use super::hub::ApprovalHub;
use super::types::{ApprovalDecision, PolicyRequest, PolicyResponse};

/// Slack on top of the evaluator's own bound before the engine gives up on
/// it. Guards against evaluator implementations that fail to enforce their
/// own timeout.
const EVAL_GRACE: Duration = Duration::from_secs(1);

/// Engine tunables.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Bound on one decision-function run.
    pub eval_timeout: Duration,
    /// Bound on an ASK wait before it resolves to a denial.
    pub approval_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            eval_timeout: Duration::from_secs(5),
            approval_timeout: Duration::from_secs(120),
        }
    }
}

/// Where a proposal stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
}

/// Operator verdict on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalDecision {
    Approve,
    Reject,
}

/// A candidate replacement for the active policy document.
#[derive(Debug, Clone, Serialize)]
pub struct Proposal {
    pub id: String,
    pub content: String,
    pub status: ProposalStatus,
    pub proposed_by: String,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub test_report: TestReport,
    /// Set when validation flagged the proposal; such proposals are not
    /// approvable until replaced.
    pub error: Option<PolicyError>,
}

/// Failures of the proposal workflow.
#[derive(Debug, thiserror::Error)]
pub enum ProposalError {
    #[error("unknown proposal '{0}'")]
    Unknown(String),
    #[error("proposal '{0}' was already decided")]
    AlreadyDecided(String),
    #[error("proposal '{id}' cannot be decided by its own proposer '{actor}'")]
    SelfDecision { id: String, actor: String },
    #[error("proposal '{id}' is not approvable: {error}")]
    NotApprovable {
        id: String,
        #[source]
        error: PolicyError,
    },
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

struct ActivePolicy {
    text: String,
    document: PolicyDocument,
}

/// The policy subsystem: active document, evaluation, proposals, pending
/// approvals.
pub struct PolicyEngine {
    active: parking_lot::RwLock<Option<Arc<ActivePolicy>>>,
    proposals: tokio::sync::Mutex<HashMap<String, Proposal>>,
    evaluator: Arc<dyn PolicyEvaluator>,
    hub: Arc<ApprovalHub>,
    config: EngineConfig,
}

impl PolicyEngine {
    pub fn new(evaluator: Arc<dyn PolicyEvaluator>, config: EngineConfig) -> Self {
        Self {
            active: parking_lot::RwLock::new(None),
            proposals: tokio::sync::Mutex::new(HashMap::new()),
            evaluator,
            hub: Arc::new(ApprovalHub::new()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The rendezvous for pending ASK calls.
    pub fn hub(&self) -> Arc<ApprovalHub> {
        Arc::clone(&self.hub)
    }

    pub fn has_active_policy(&self) -> bool {
        self.active.read().is_some()
    }

    /// Source text of the active document, for the reader surface.
    pub fn active_policy_text(&self) -> Option<String> {
        self.active.read().as_ref().map(|active| active.text.clone())
    }

    fn activate(&self, text: &str, document: PolicyDocument) {
        let mut slot = self.active.write();
        *slot = Some(Arc::new(ActivePolicy {
            text: text.to_string(),
            document,
        }));
    }

    /// Evaluate the active decision function for one request.
    ///
    /// Never returns an error and never hangs: with no active document the
    /// answer is ASK; a hung evaluator resolves to ASK with a timeout
    /// rationale; a crashed one resolves to DENY_ABORT. The decision
    /// function is invoked exactly once per request.
    pub async fn evaluate(&self, request: &PolicyRequest) -> PolicyResponse {
        let active = self.active.read().clone();
        let Some(active) = active else {
            return PolicyResponse::new(
                ApprovalDecision::Ask,
                "no active policy document; awaiting operator decision",
            );
        };

        let decide = self.evaluator.decide(&active.document, request);
        match tokio::time::timeout(self.config.eval_timeout + EVAL_GRACE, decide).await {
            Ok(Ok(response)) => response,
            Ok(Err(EvaluationError::TimedOut(bound))) => {
                warn!(name = %request.name, ?bound, "decision function timed out");
                PolicyResponse::new(
                    ApprovalDecision::Ask,
                    format!(
                        "policy evaluation timed out after {}ms; awaiting operator decision",
                        bound.as_millis()
                    ),
                )
            }
            Ok(Err(err)) => {
                warn!(name = %request.name, %err, "decision function failed; denying");
                PolicyResponse::new(
                    ApprovalDecision::DenyAbort,
                    format!("policy evaluation failed: {err}"),
                )
            }
            Err(_) => {
                warn!(name = %request.name, "evaluator overran its bound; treating as timeout");
                PolicyResponse::new(
                    ApprovalDecision::Ask,
                    format!(
                        "policy evaluation timed out after {}ms; awaiting operator decision",
                        self.config.eval_timeout.as_millis()
                    ),
                )
            }
        }
    }

    /// Run a document's embedded regression set against itself.
    pub async fn run_document_tests(&self, document: &PolicyDocument) -> TestReport {
        let mut cases = Vec::with_capacity(document.tests.len());
        for case in &document.tests {
            let decide = self.evaluator.decide(document, &case.request);
            let outcome =
                match tokio::time::timeout(self.config.eval_timeout + EVAL_GRACE, decide).await {
                    Ok(Ok(response)) if response.decision == case.expect => TestOutcome::Passed,
                    Ok(Ok(response)) => TestOutcome::Mismatch {
                        actual: response.decision,
                        rationale: response.rationale,
                    },
                    Ok(Err(err)) => TestOutcome::Error {
                        message: err.to_string(),
                    },
                    Err(_) => TestOutcome::Error {
                        message: "evaluation timed out".to_string(),
                    },
                };
            cases.push(TestCaseResult {
                name: case.name.clone(),
                expected: case.expect,
                outcome,
            });
        }
        TestReport { cases }
    }

    async fn self_check(&self, text: &str) -> Result<(PolicyDocument, TestReport), PolicyError> {
        let document = PolicyDocument::parse(text)?;
        let report = self.run_document_tests(&document).await;
        if !report.passed() {
            return Err(PolicyError::Tests(report.summary()));
        }
        Ok((document, report))
    }

    /// Trusted-path activation, bypassing the proposal workflow. Reserved
    /// for operators and tests; still self-checked, and a failing check
    /// leaves the active document unchanged.
    pub async fn set_policy_text(&self, text: &str) -> Result<TestReport, PolicyError> {
        let (document, report) = self.self_check(text).await?;
        self.activate(text, document);
        info!("active policy replaced via trusted path");
        Ok(report)
    }

    /// Bootstrap the active document from a trusted file.
    pub async fn load_policy_file(&self, path: &Path) -> Result<TestReport, PolicyError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| PolicyError::Read(format!("{}: {err}", path.display())))?;
        let report = self.set_policy_text(&text).await?;
        info!(path = %path.display(), "policy loaded from file");
        Ok(report)
    }

    /// Create a proposal from policy text.
    ///
    /// Parse failures block creation. A proposal whose embedded tests fail
    /// is still created, but flagged and not eligible for approval.
    pub async fn create_proposal(
        &self,
        content: &str,
        proposed_by: &str,
    ) -> Result<Proposal, PolicyError> {
        let document = PolicyDocument::parse(content)?;
        let report = self.run_document_tests(&document).await;
        let error = if report.passed() {
            None
        } else {
            Some(PolicyError::Tests(report.summary()))
        };

        let proposal = Proposal {
            id: Uuid::new_v4().simple().to_string(),
            content: content.to_string(),
            status: ProposalStatus::Pending,
            proposed_by: proposed_by.to_string(),
            created_at: Utc::now(),
            decided_at: None,
            test_report: report,
            error,
        };
        info!(
            id = %proposal.id,
            proposed_by,
            flagged = proposal.error.is_some(),
            "policy proposal created"
        );
        self.proposals
            .lock()
            .await
            .insert(proposal.id.clone(), proposal.clone());
        Ok(proposal)
    }

    /// Decide a pending proposal.
    ///
    /// Only an actor distinct from the proposer may decide. Approval
    /// re-checks the document and atomically replaces the active policy;
    /// deciding an already-decided proposal reports the prior outcome
    /// without re-applying anything.
    pub async fn decide_proposal(
        &self,
        id: &str,
        decision: ProposalDecision,
        decided_by: &str,
    ) -> Result<Proposal, ProposalError> {
        let mut proposals = self.proposals.lock().await;
        let proposal = proposals
            .get(id)
            .ok_or_else(|| ProposalError::Unknown(id.to_string()))?;

        if proposal.status != ProposalStatus::Pending {
            return Ok(proposal.clone());
        }
        if proposal.proposed_by == decided_by {
            return Err(ProposalError::SelfDecision {
                id: id.to_string(),
                actor: decided_by.to_string(),
            });
        }

        match decision {
            ProposalDecision::Approve => {
                if let Some(error) = &proposal.error {
                    return Err(ProposalError::NotApprovable {
                        id: id.to_string(),
                        error: error.clone(),
                    });
                }
                // Re-check at approval time; the environment may have
                // drifted since creation.
                let content = proposal.content.clone();
                let (document, report) =
                    self.self_check(&content)
                        .await
                        .map_err(|error| ProposalError::NotApprovable {
                            id: id.to_string(),
                            error,
                        })?;
                self.activate(&content, document);

                let proposal = proposals
                    .get_mut(id)
                    .ok_or_else(|| ProposalError::Unknown(id.to_string()))?;
                proposal.status = ProposalStatus::Approved;
                proposal.decided_at = Some(Utc::now());
                proposal.test_report = report;
                info!(id, decided_by, "proposal approved; active policy replaced");
                Ok(proposal.clone())
            }
            ProposalDecision::Reject => {
                let proposal = proposals
                    .get_mut(id)
                    .ok_or_else(|| ProposalError::Unknown(id.to_string()))?;
                proposal.status = ProposalStatus::Rejected;
                proposal.decided_at = Some(Utc::now());
                info!(id, decided_by, "proposal rejected");
                Ok(proposal.clone())
            }
        }
    }

    /// Remove a pending proposal. Decided proposals stay for the record.
    pub async fn withdraw_proposal(&self, id: &str) -> Result<(), ProposalError> {
        let mut proposals = self.proposals.lock().await;
        match proposals.get(id) {
            None => Err(ProposalError::Unknown(id.to_string())),
            Some(proposal) if proposal.status != ProposalStatus::Pending => {
                Err(ProposalError::AlreadyDecided(id.to_string()))
            }
            Some(_) => {
                proposals.remove(id);
                info!(id, "proposal withdrawn");
                Ok(())
            }
        }
    }

    /// Snapshot of all proposals, newest first.
    pub async fn proposals(&self) -> Vec<Proposal> {
        let proposals = self.proposals.lock().await;
        let mut all: Vec<Proposal> = proposals.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }
}
