//! # toolgate-core - Runtime for Toolgate
//!
//! `toolgate-core` powers the Toolgate tool-execution gateway. It provides
//! the building blocks for mediating tool calls issued by autonomous agents:
//! every call is resolved through a namespace-multiplexing compositor,
//! checked against a live, replaceable approval policy, and executed inside
//! an OS-level process isolation backend with hard output and time bounds.
//!
//! ## Architecture Overview
//!
//! - `compositor/`: the mount registry. Backends are mounted under validated
//!   namespace prefixes, tool names are qualified as `{prefix}__{tool}`, and
//!   dispatch routes calls to the owning backend after the policy gate
//!   clears them. Mount lifecycle changes are broadcast to subscribers.
//! - `policy/`: the approval policy engine. The active decision function is
//!   a sandboxed script, validated against an embedded regression test set,
//!   and replaced only through a propose/approve workflow. `ASK` decisions
//!   suspend the call until an operator resolves them.
//! - `sandbox/`: the declarative sandbox policy model and the deterministic
//!   seatbelt (SBPL) profile compiler consumed by the profile-sandboxed
//!   backend.
//! - `exec/`: the bounded execution contract and its four interchangeable
//!   backends (direct, bubblewrap, seatbelt, container), plus an adapter
//!   that exposes any backend as a mountable tool provider.
//! - `config/`: TOML configuration for wiring the above together.
//!
//! ## Quickstart
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use toolgate_core::compositor::{Compositor, MountOptions, MountPrefix};
//! use toolgate_core::exec::{DirectBackend, ExecLimits, ExecToolBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let compositor = Compositor::new();
//!     let runtime = ExecToolBackend::new(Arc::new(DirectBackend::new()), ExecLimits::default());
//!     compositor
//!         .mount(MountPrefix::new("runtime")?, Arc::new(runtime), MountOptions::default())
//!         .await?;
//!     let out = compositor
//!         .dispatch("runtime__exec", serde_json::json!({"cmd": ["echo", "hello"]}))
//!         .await?;
//!     println!("{out}");
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod compositor;
pub mod config;
pub mod exec;
pub mod policy;
pub mod sandbox;

pub use backend::{ToolBackend, ToolSpec};
pub use compositor::{Compositor, CompositorError, MountOptions, MountPrefix};
pub use policy::{ApprovalDecision, PolicyEngine, PolicyRequest, PolicyResponse};
