//! Namespace-multiplexing registry for tool-providing backends.
//!
//! The compositor is the single source of truth for which tool names exist
//! and where they route. Backends are mounted under validated prefixes,
//! calls arrive with qualified names (`{prefix}__{tool}`), and dispatch
//! resolves the prefix, clears the call through the approval policy gate
//! when the mount is gated, and forwards it to the owning backend.
//!
//! Concurrency discipline: the registry is a `tokio::sync::RwLock` map, so
//! dispatch lookups proceed concurrently while mounts and unmounts
//! serialize on the write lock. A mount or unmount is fully visible to
//! subsequent dispatches before the operation returns, and concurrent
//! mounts of the same prefix have exactly one winner.

mod error;
mod events;
mod meta;
mod mount;
pub mod prefix;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::backend::{ToolBackend, ToolSpec};
use crate::policy::PolicyRequest;

pub use error::CompositorError;
pub use events::{MountEvent, MountEventKind};
pub use meta::CompositorMetaBackend;
pub use mount::{MountOptions, MountState, MountSummary};
pub use prefix::{MountPrefix, PREFIX_DELIMITER};

use mount::MountEntry;

/// Capacity of the lifecycle event channel. Slow subscribers lose events
/// rather than back-pressuring registry operations.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Outcome of consulting the policy gate for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Dispatch the call to the backend.
    Proceed,
    /// Fail the call without dispatching.
    Deny { reason: String },
}

/// Policy enforcement seam consulted before dispatching to a gated mount.
///
/// The production implementation is [`crate::policy::PolicyGateway`]; tests
/// substitute their own.
#[async_trait]
pub trait DispatchGate: Send + Sync {
    async fn clear(&self, request: PolicyRequest) -> GateOutcome;
}

/// The mount registry and dispatcher.
pub struct Compositor {
    mounts: RwLock<HashMap<MountPrefix, MountEntry>>,
    events: broadcast::Sender<MountEvent>,
    gate: Option<Arc<dyn DispatchGate>>,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor {
    /// Compositor without a policy gate: gated mounts dispatch freely.
    /// Intended for tests and trusted embeddings.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            mounts: RwLock::new(HashMap::new()),
            events,
            gate: None,
        }
    }

    /// Compositor whose gated mounts are cleared through `gate`.
    pub fn with_gate(gate: Arc<dyn DispatchGate>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            mounts: RwLock::new(HashMap::new()),
            events,
            gate: Some(gate),
        }
    }

    /// Subscribe to mount lifecycle events. Delivery is best-effort.
    pub fn subscribe(&self) -> broadcast::Receiver<MountEvent> {
        self.events.subscribe()
    }

    fn emit(&self, kind: MountEventKind, prefix: &MountPrefix) {
        // Nobody listening is fine; emission never fails registry operations.
        let _ = self
            .events
            .send(MountEvent::new(kind, prefix.as_str()));
    }

    /// Register `backend` under `prefix`.
    ///
    /// Fails with [`CompositorError::DuplicateMount`] if the prefix is
    /// taken; the duplicate check and the insert happen under one write-lock
    /// critical section.
    pub async fn mount(
        &self,
        prefix: MountPrefix,
        backend: Arc<dyn ToolBackend>,
        options: MountOptions,
    ) -> Result<(), CompositorError> {
        {
            let mut mounts = self.mounts.write().await;
            if mounts.contains_key(&prefix) {
                return Err(CompositorError::DuplicateMount(prefix));
            }
            mounts.insert(prefix.clone(), MountEntry::new(backend, options));
        }
        info!(prefix = %prefix, pinned = options.pinned, gated = options.gated, "mounted backend");
        self.emit(MountEventKind::State, &prefix);
        self.emit(MountEventKind::Mounted, &prefix);
        Ok(())
    }

    /// Remove the mount at `prefix`.
    ///
    /// Pinned entries fail with [`CompositorError::PinnedMount`] and are
    /// left untouched; pin is a guard, not a hint. Unmounting a prefix that
    /// is not mounted is a no-op.
    pub async fn unmount(&self, prefix: &MountPrefix) -> Result<(), CompositorError> {
        let removed = {
            let mut mounts = self.mounts.write().await;
            match mounts.get_mut(prefix) {
                None => {
                    debug!(prefix = %prefix, "unmount of absent prefix is a no-op");
                    return Ok(());
                }
                Some(entry) if entry.pinned => {
                    return Err(CompositorError::PinnedMount(prefix.clone()));
                }
                Some(entry) => {
                    entry.state = MountState::Unmounting;
                }
            }
            let mut entry = mounts.remove(prefix);
            if let Some(entry) = entry.as_mut() {
                entry.state = MountState::Unmounted;
            }
            entry
        };
        if removed.is_some() {
            info!(prefix = %prefix, "unmounted backend");
            self.emit(MountEventKind::Unmounted, prefix);
        }
        Ok(())
    }

    /// Clear the pin on a mount.
    ///
    /// This is the only way out of pin protection: an audited two-step
    /// (`unpin` then `unmount`) instead of a force-unmount.
    pub async fn unpin(&self, prefix: &MountPrefix) -> Result<(), CompositorError> {
        {
            let mut mounts = self.mounts.write().await;
            let entry = mounts
                .get_mut(prefix)
                .ok_or_else(|| CompositorError::UnknownMount(prefix.to_string()))?;
            if !entry.pinned {
                return Ok(());
            }
            entry.pinned = false;
        }
        info!(prefix = %prefix, "unpinned mount");
        self.emit(MountEventKind::State, prefix);
        Ok(())
    }

    /// Snapshot of the registry. Never exposes live mutable state.
    pub async fn entries(&self) -> Vec<MountSummary> {
        let mounts = self.mounts.read().await;
        let mut summaries: Vec<MountSummary> = mounts
            .iter()
            .map(|(prefix, entry)| MountSummary {
                prefix: prefix.clone(),
                pinned: entry.pinned,
                gated: entry.gated,
                state: entry.state,
            })
            .collect();
        summaries.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        summaries
    }

    /// All tools currently reachable, with qualified names, sorted.
    pub async fn tool_specs(&self) -> Vec<ToolSpec> {
        let mounts = self.mounts.read().await;
        let mut specs = Vec::new();
        for (mount_prefix, entry) in mounts.iter() {
            for spec in entry.backend.tools() {
                match prefix::join(mount_prefix, &spec.name) {
                    Ok(qualified) => specs.push(spec.qualified(qualified)),
                    Err(err) => {
                        warn!(prefix = %mount_prefix, tool = %spec.name, %err,
                            "backend exposed a tool name that cannot be qualified; skipping");
                    }
                }
            }
        }
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Route one qualified call to its backend.
    ///
    /// The name is split on the first occurrence of the reserved delimiter;
    /// an unmounted prefix fails with [`CompositorError::UnknownMount`]. If
    /// the mount is gated and a policy gate is installed, the gate decides
    /// before anything reaches the backend: a denial means the backend
    /// observes no side effect at all.
    pub async fn dispatch(&self, qualified: &str, args: Value) -> Result<Value, CompositorError> {
        let (mount_prefix, tool) = prefix::split(qualified)?;

        let (backend, gated) = {
            let mounts = self.mounts.read().await;
            let entry = mounts
                .get(&mount_prefix)
                .ok_or_else(|| CompositorError::UnknownMount(mount_prefix.to_string()))?;
            (Arc::clone(&entry.backend), entry.gated)
        };

        if gated {
            if let Some(gate) = &self.gate {
                let request = PolicyRequest::for_call(qualified, &args);
                match gate.clear(request).await {
                    GateOutcome::Proceed => {}
                    GateOutcome::Deny { reason } => {
                        info!(name = qualified, %reason, "policy denied dispatch");
                        return Err(CompositorError::PolicyDenied {
                            name: qualified.to_string(),
                            reason,
                        });
                    }
                }
            }
        }

        debug!(name = qualified, "dispatching tool call");
        backend
            .call_tool(tool, args)
            .await
            .map_err(|source| CompositorError::Backend {
                name: qualified.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use serde_json::json;

    use super::*;

    /// Backend that counts invocations and echoes its arguments.
    struct EchoBackend {
        calls: AtomicUsize,
    }

    impl EchoBackend {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ToolBackend for EchoBackend {
        fn tools(&self) -> Vec<ToolSpec> {
            vec![ToolSpec::new("echo", "Echo arguments back", json!({"type": "object"}))]
        }

        async fn call_tool(&self, tool: &str, args: Value) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match tool {
                "echo" => Ok(json!({"echo": args})),
                other => Err(anyhow!("unknown tool '{other}'")),
            }
        }
    }

    struct DenyAllGate;

    #[async_trait]
    impl DispatchGate for DenyAllGate {
        async fn clear(&self, _request: PolicyRequest) -> GateOutcome {
            GateOutcome::Deny {
                reason: "denied by test gate".to_string(),
            }
        }
    }

    fn prefix(raw: &str) -> MountPrefix {
        MountPrefix::new(raw).unwrap()
    }

    #[tokio::test]
    async fn mount_twice_fails_and_leaves_one_entry() {
        let compositor = Compositor::new();
        let backend = Arc::new(EchoBackend::new());
        compositor
            .mount(prefix("backend"), backend.clone(), MountOptions::default())
            .await
            .unwrap();
        let err = compositor
            .mount(prefix("backend"), backend, MountOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CompositorError::DuplicateMount(_)));

        let entries = compositor.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prefix.as_str(), "backend");
    }

    #[tokio::test]
    async fn pinned_mount_survives_unmount_attempt() {
        let compositor = Compositor::new();
        compositor
            .mount(
                prefix("backend"),
                Arc::new(EchoBackend::new()),
                MountOptions::default().pinned(true),
            )
            .await
            .unwrap();

        let err = compositor.unmount(&prefix("backend")).await.unwrap_err();
        assert!(matches!(err, CompositorError::PinnedMount(_)));

        let entries = compositor.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prefix.as_str(), "backend");
        assert!(entries[0].pinned);
        assert_eq!(entries[0].state, MountState::Mounted);
    }

    #[tokio::test]
    async fn unpin_then_unmount_succeeds() {
        let compositor = Compositor::new();
        compositor
            .mount(
                prefix("backend"),
                Arc::new(EchoBackend::new()),
                MountOptions::default().pinned(true),
            )
            .await
            .unwrap();

        compositor.unpin(&prefix("backend")).await.unwrap();
        compositor.unmount(&prefix("backend")).await.unwrap();
        assert!(compositor.entries().await.is_empty());
    }

    #[tokio::test]
    async fn unmount_of_absent_prefix_is_noop() {
        let compositor = Compositor::new();
        compositor.unmount(&prefix("ghost")).await.unwrap();
    }

    #[tokio::test]
    async fn unpin_of_absent_prefix_fails() {
        let compositor = Compositor::new();
        let err = compositor.unpin(&prefix("ghost")).await.unwrap_err();
        assert!(matches!(err, CompositorError::UnknownMount(_)));
    }

    #[tokio::test]
    async fn dispatch_routes_to_backend() {
        let compositor = Compositor::new();
        compositor
            .mount(prefix("backend"), Arc::new(EchoBackend::new()), MountOptions::default())
            .await
            .unwrap();

        let out = compositor
            .dispatch("backend__echo", json!({"text": "7"}))
            .await
            .unwrap();
        assert_eq!(out, json!({"echo": {"text": "7"}}));
    }

    #[tokio::test]
    async fn dispatch_unknown_prefix_fails() {
        let compositor = Compositor::new();
        let err = compositor
            .dispatch("ghost__echo", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CompositorError::UnknownMount(_)));
    }

    #[tokio::test]
    async fn dispatch_rejects_unqualified_name() {
        let compositor = Compositor::new();
        let err = compositor.dispatch("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, CompositorError::Validation(_)));
    }

    #[tokio::test]
    async fn denied_dispatch_never_reaches_backend() {
        let backend = Arc::new(EchoBackend::new());
        let compositor = Compositor::with_gate(Arc::new(DenyAllGate));
        compositor
            .mount(prefix("backend"), backend.clone(), MountOptions::default())
            .await
            .unwrap();

        let err = compositor
            .dispatch("backend__echo", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CompositorError::PolicyDenied { .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ungated_mount_bypasses_gate() {
        let backend = Arc::new(EchoBackend::new());
        let compositor = Compositor::with_gate(Arc::new(DenyAllGate));
        compositor
            .mount(prefix("backend"), backend.clone(), MountOptions::trusted())
            .await
            .unwrap();

        compositor
            .dispatch("backend__echo", json!({}))
            .await
            .unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_mounts_have_one_winner() {
        let compositor = Arc::new(Compositor::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let compositor = Arc::clone(&compositor);
            handles.push(tokio::spawn(async move {
                compositor
                    .mount(
                        MountPrefix::new("contended").unwrap(),
                        Arc::new(EchoBackend::new()) as Arc<dyn ToolBackend>,
                        MountOptions::default(),
                    )
                    .await
            }));
        }
        let mut wins = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => wins += 1,
                Err(CompositorError::DuplicateMount(_)) => duplicates += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(compositor.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn dispatches_to_different_mounts_run_independently() {
        /// Backend that blocks until told to finish.
        struct BlockingBackend {
            release: tokio::sync::Notify,
        }

        #[async_trait]
        impl ToolBackend for BlockingBackend {
            fn tools(&self) -> Vec<ToolSpec> {
                vec![ToolSpec::new("wait", "Block until released", json!({"type": "object"}))]
            }

            async fn call_tool(&self, _tool: &str, _args: Value) -> anyhow::Result<Value> {
                self.release.notified().await;
                Ok(json!({"done": true}))
            }
        }

        let blocking = Arc::new(BlockingBackend {
            release: tokio::sync::Notify::new(),
        });
        let compositor = Arc::new(Compositor::new());
        compositor
            .mount(prefix("slow"), blocking.clone(), MountOptions::default())
            .await
            .unwrap();
        compositor
            .mount(prefix("fast"), Arc::new(EchoBackend::new()), MountOptions::default())
            .await
            .unwrap();

        let slow_call = {
            let compositor = Arc::clone(&compositor);
            tokio::spawn(async move { compositor.dispatch("slow__wait", json!({})).await })
        };

        // The fast mount answers while the slow call is still in flight.
        let out = compositor.dispatch("fast__echo", json!({})).await.unwrap();
        assert_eq!(out, json!({"echo": {}}));
        assert!(!slow_call.is_finished());

        blocking.release.notify_one();
        slow_call.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn lifecycle_events_are_broadcast() {
        let compositor = Compositor::new();
        let mut events = compositor.subscribe();

        compositor
            .mount(prefix("backend"), Arc::new(EchoBackend::new()), MountOptions::default())
            .await
            .unwrap();
        compositor.unmount(&prefix("backend")).await.unwrap();

        let first = events.recv().await.unwrap();
        assert_eq!(first.kind, MountEventKind::State);
        let second = events.recv().await.unwrap();
        assert_eq!(second.kind, MountEventKind::Mounted);
        assert_eq!(second.prefix, "backend");
        let third = events.recv().await.unwrap();
        assert_eq!(third.kind, MountEventKind::Unmounted);
    }

    #[tokio::test]
    async fn tool_specs_are_qualified() {
        let compositor = Compositor::new();
        compositor
            .mount(prefix("backend"), Arc::new(EchoBackend::new()), MountOptions::default())
            .await
            .unwrap();
        let specs = compositor.tool_specs().await;
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "backend__echo");
    }
}
