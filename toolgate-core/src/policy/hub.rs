//! Rendezvous for pending ASK approvals.
//!
//! A suspended call registers here and waits on a oneshot channel until an
//! operator resolves it or the wait times out. The pending record is
//! removed when the ticket resolves *or* is dropped, so abandoned waits
//! (caller cancellation) cannot leak pending-approval entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::debug;

use super::types::PolicyRequest;

/// One suspended call, as shown to operators.
#[derive(Debug, Clone, Serialize)]
pub struct PendingCall {
    pub call_id: String,
    pub name: String,
    pub arguments_json: Option<String>,
}

impl PendingCall {
    pub fn from_request(call_id: impl Into<String>, request: &PolicyRequest) -> Self {
        Self {
            call_id: call_id.into(),
            name: request.name.clone(),
            arguments_json: request.arguments_json.clone(),
        }
    }
}

/// Operator resolution of a pending call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallResolution {
    Approved,
    Denied { reason: String },
}

struct PendingEntry {
    call: PendingCall,
    sender: oneshot::Sender<CallResolution>,
}

/// Shared pending-call registry.
#[derive(Default)]
pub struct ApprovalHub {
    pending: parking_lot::Mutex<HashMap<String, PendingEntry>>,
}

impl ApprovalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a suspended call and obtain the ticket to wait on.
    pub fn register(self: &Arc<Self>, call: PendingCall) -> ApprovalTicket {
        let (sender, receiver) = oneshot::channel();
        let call_id = call.call_id.clone();
        self.pending.lock().insert(
            call_id.clone(),
            PendingEntry {
                call,
                sender,
            },
        );
        ApprovalTicket {
            hub: Arc::clone(self),
            call_id,
            receiver,
        }
    }

    /// Resolve a pending call. Returns false when the call is unknown
    /// (already resolved, timed out, or abandoned).
    pub fn resolve(&self, call_id: &str, resolution: CallResolution) -> bool {
        let entry = self.pending.lock().remove(call_id);
        match entry {
            Some(entry) => {
                // A dropped receiver just means the waiter went away first.
                let _ = entry.sender.send(resolution);
                true
            }
            None => false,
        }
    }

    /// Snapshot of calls currently awaiting a decision.
    pub fn pending(&self) -> Vec<PendingCall> {
        let mut calls: Vec<PendingCall> = self
            .pending
            .lock()
            .values()
            .map(|entry| entry.call.clone())
            .collect();
        calls.sort_by(|a, b| a.call_id.cmp(&b.call_id));
        calls
    }

    fn forget(&self, call_id: &str) {
        if self.pending.lock().remove(call_id).is_some() {
            debug!(call_id, "pending approval abandoned");
        }
    }
}

/// Wait handle for one registered call. Dropping it (resolved, timed out,
/// or cancelled) removes the pending record.
pub struct ApprovalTicket {
    hub: Arc<ApprovalHub>,
    call_id: String,
    receiver: oneshot::Receiver<CallResolution>,
}

impl ApprovalTicket {
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Wait for resolution, bounded by `timeout`. Expiry denies the call
    /// with an explicit reason; it never hangs the call path.
    pub async fn wait(mut self, timeout: Duration) -> CallResolution {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(_closed)) => CallResolution::Denied {
                reason: "approval channel closed".to_string(),
            },
            Err(_) => CallResolution::Denied {
                reason: "timed out awaiting approval".to_string(),
            },
        }
    }
}

impl Drop for ApprovalTicket {
    fn drop(&mut self) {
        self.hub.forget(&self.call_id);
    }
}
