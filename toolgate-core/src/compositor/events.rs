//! Mount lifecycle events broadcast to observers.
//!
//! Delivery is best-effort: events ride a bounded broadcast channel, lagging
//! subscribers lose old events, and emission never blocks or fails a
//! registry operation. Consumers typically use these to invalidate cached
//! tool listings.

use serde::Serialize;

/// What happened to a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountEventKind {
    /// A backend was registered and is ready for dispatch.
    Mounted,
    /// A backend was removed from the registry.
    Unmounted,
    /// An entry changed without being added or removed (e.g. unpinned).
    State,
}

/// A single lifecycle notification.
#[derive(Debug, Clone, Serialize)]
pub struct MountEvent {
    pub kind: MountEventKind,
    pub prefix: String,
}

impl MountEvent {
    pub fn new(kind: MountEventKind, prefix: impl Into<String>) -> Self {
        Self {
            kind,
            prefix: prefix.into(),
        }
    }
}
