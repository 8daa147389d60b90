//! Error taxonomy for the compositor.

use super::prefix::MountPrefix;

/// Errors surfaced by registry operations and dispatch.
///
/// None of these are fatal to the gateway: every variant is reported to the
/// caller with a rationale and leaves the registry in a consistent state.
#[derive(Debug, thiserror::Error)]
pub enum CompositorError {
    /// A prefix or tool name failed validation. Rejected before any state
    /// change.
    #[error("invalid identifier: {0}")]
    Validation(String),

    /// Mounting under a prefix that is already taken.
    #[error("mount prefix '{0}' is already mounted")]
    DuplicateMount(MountPrefix),

    /// Dispatch or a targeted operation named a prefix that is not mounted.
    #[error("no backend is mounted at prefix '{0}'")]
    UnknownMount(String),

    /// Unmounting a pinned entry. The entry is left untouched.
    #[error("mount '{0}' is pinned; unpin it before unmounting")]
    PinnedMount(MountPrefix),

    /// The approval policy refused the call; nothing was dispatched.
    #[error("policy denied call to '{name}': {reason}")]
    PolicyDenied { name: String, reason: String },

    /// The backend accepted the call but failed while executing it.
    #[error("backend call '{name}' failed: {source}")]
    Backend {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl CompositorError {
    /// Stable machine-readable kind for transports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::DuplicateMount(_) => "duplicate_mount",
            Self::UnknownMount(_) => "unknown_mount",
            Self::PinnedMount(_) => "pinned_mount",
            Self::PolicyDenied { .. } => "policy_denied",
            Self::Backend { .. } => "backend_error",
        }
    }
}
