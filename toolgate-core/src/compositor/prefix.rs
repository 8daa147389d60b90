//! Mount prefix validation and qualified tool names.
//!
//! A qualified tool name is `{prefix}__{tool}`. The two-character delimiter
//! is reserved: neither component may contain it, a prefix may not end with
//! an underscore and a tool name may not start with one, so the first
//! occurrence of `__` in a qualified name is always the delimiter and
//! `split(join(prefix, tool)) == (prefix, tool)` holds for every valid pair.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::CompositorError;

/// Reserved separator between a mount prefix and a tool name.
pub const PREFIX_DELIMITER: &str = "__";

/// Upper bound on prefix length, matching what transports tolerate in ids.
pub const MAX_PREFIX_LEN: usize = 64;

/// A validated namespace prefix under which a backend is mounted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MountPrefix(String);

impl MountPrefix {
    /// Validate and wrap a raw prefix string.
    pub fn new(raw: impl Into<String>) -> Result<Self, CompositorError> {
        let raw = raw.into();
        validate_component(&raw, "mount prefix")?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MountPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MountPrefix {
    type Err = CompositorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for MountPrefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MountPrefix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        MountPrefix::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Shared validation for prefixes and tool names.
///
/// Rules: non-empty, at most [`MAX_PREFIX_LEN`] bytes, first character
/// `a-z`, remaining characters `a-z0-9_`, no trailing underscore, and the
/// reserved delimiter must not appear.
pub(crate) fn validate_component(raw: &str, what: &str) -> Result<(), CompositorError> {
    if raw.is_empty() {
        return Err(CompositorError::Validation(format!("{what} must not be empty")));
    }
    if raw.len() > MAX_PREFIX_LEN {
        return Err(CompositorError::Validation(format!(
            "{what} '{raw}' exceeds {MAX_PREFIX_LEN} bytes"
        )));
    }
    let mut chars = raw.chars();
    let first = chars.next().unwrap_or_default();
    if !first.is_ascii_lowercase() {
        return Err(CompositorError::Validation(format!(
            "{what} '{raw}' must start with a lowercase letter"
        )));
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(CompositorError::Validation(format!(
            "{what} '{raw}' may only contain lowercase letters, digits, and underscores"
        )));
    }
    if raw.ends_with('_') {
        return Err(CompositorError::Validation(format!(
            "{what} '{raw}' must not end with an underscore"
        )));
    }
    if raw.contains(PREFIX_DELIMITER) {
        return Err(CompositorError::Validation(format!(
            "{what} '{raw}' must not contain the reserved delimiter '{PREFIX_DELIMITER}'"
        )));
    }
    Ok(())
}

/// Build the qualified name for a tool under a mount prefix.
pub fn join(prefix: &MountPrefix, tool: &str) -> Result<String, CompositorError> {
    validate_component(tool, "tool name")?;
    Ok(format!("{}{}{}", prefix.as_str(), PREFIX_DELIMITER, tool))
}

/// Split a qualified name into its mount prefix and tool name.
///
/// The prefix is everything before the first occurrence of the delimiter.
pub fn split(qualified: &str) -> Result<(MountPrefix, &str), CompositorError> {
    let Some(idx) = qualified.find(PREFIX_DELIMITER) else {
        return Err(CompositorError::Validation(format!(
            "'{qualified}' is not a qualified tool name (missing '{PREFIX_DELIMITER}')"
        )));
    };
    let prefix = MountPrefix::new(&qualified[..idx])?;
    let tool = &qualified[idx + PREFIX_DELIMITER.len()..];
    validate_component(tool, "tool name")?;
    Ok((prefix, tool))
}
