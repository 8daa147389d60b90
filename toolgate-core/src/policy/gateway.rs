//! Enforcement of policy decisions in front of dispatch.
//!
//! The gateway turns a [`PolicyResponse`] into a single proceed-or-deny
//! signal for the compositor: ALLOW proceeds, DENY_ABORT denies, and ASK
//! parks the call on the approval hub until an operator resolves it or the
//! approval timeout denies it. Gated backends therefore observe no side
//! effect from a call the policy refused.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::compositor::{DispatchGate, GateOutcome};

use super::engine::PolicyEngine;
use super::hub::{CallResolution, PendingCall};
use super::types::{ApprovalDecision, PolicyRequest};

pub struct PolicyGateway {
    engine: Arc<PolicyEngine>,
}

impl PolicyGateway {
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> Arc<PolicyEngine> {
        Arc::clone(&self.engine)
    }
}

#[async_trait]
impl DispatchGate for PolicyGateway {
    async fn clear(&self, request: PolicyRequest) -> GateOutcome {
        let response = self.engine.evaluate(&request).await;
        match response.decision {
            ApprovalDecision::Allow => GateOutcome::Proceed,
            ApprovalDecision::DenyAbort => GateOutcome::Deny {
                reason: response.rationale,
            },
            ApprovalDecision::Ask => {
                let call_id = format!("pg-{}", Uuid::new_v4().simple());
                let ticket = self
                    .engine
                    .hub()
                    .register(PendingCall::from_request(&call_id, &request));
                info!(
                    call_id,
                    name = %request.name,
                    rationale = %response.rationale,
                    "call suspended awaiting approval"
                );
                match ticket.wait(self.engine.config().approval_timeout).await {
                    CallResolution::Approved => GateOutcome::Proceed,
                    CallResolution::Denied { reason } => GateOutcome::Deny { reason },
                }
            }
        }
    }
}
