//! Mount entry bookkeeping.

use std::sync::Arc;

use serde::Serialize;

use crate::backend::ToolBackend;

use super::prefix::MountPrefix;

/// Lifecycle state of a mount entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountState {
    /// Registered and routable.
    Mounted,
    /// Removal in progress; no longer routable.
    Unmounting,
    /// Removed from the registry.
    Unmounted,
}

/// Options supplied at mount time.
///
/// `pinned` protects the entry from unmounting until it is explicitly
/// unpinned. `gated` routes every dispatch to this mount through the
/// approval policy gateway first.
#[derive(Debug, Clone, Copy)]
pub struct MountOptions {
    pub pinned: bool,
    pub gated: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            pinned: false,
            gated: true,
        }
    }
}

impl MountOptions {
    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn gated(mut self, gated: bool) -> Self {
        self.gated = gated;
        self
    }

    /// Ungated, unpinned: for trusted infrastructure surfaces.
    pub fn trusted() -> Self {
        Self {
            pinned: false,
            gated: false,
        }
    }
}

/// Registry entry. Owned exclusively by the compositor; backends never learn
/// that they are mounted.
pub(super) struct MountEntry {
    pub backend: Arc<dyn ToolBackend>,
    pub pinned: bool,
    pub gated: bool,
    pub state: MountState,
}

impl MountEntry {
    pub fn new(backend: Arc<dyn ToolBackend>, options: MountOptions) -> Self {
        Self {
            backend,
            pinned: options.pinned,
            gated: options.gated,
            state: MountState::Mounted,
        }
    }
}

/// Snapshot of one mount, safe to hand to callers.
#[derive(Debug, Clone, Serialize)]
pub struct MountSummary {
    pub prefix: MountPrefix,
    pub pinned: bool,
    pub gated: bool,
    pub state: MountState,
}
