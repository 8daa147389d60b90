//! Tool-provider trait implemented by everything the compositor can mount.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Description of a single tool exposed by a backend.
///
/// `parameters` is a JSON schema object describing the tool's arguments, in
/// the shape transports expect when they introspect the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Return a copy of this spec with the tool name replaced by its
    /// qualified form.
    pub fn qualified(&self, qualified_name: String) -> Self {
        Self {
            name: qualified_name,
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// A provider of tools that can be mounted on the compositor.
///
/// Backends are unaware of mounting: they see unqualified tool names and
/// JSON argument objects, and the compositor owns the namespace. Errors
/// returned here are reported to the caller as backend failures; they never
/// take the gateway down.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Tools currently exposed by this backend, with unqualified names.
    fn tools(&self) -> Vec<ToolSpec>;

    /// Invoke one tool by its unqualified name.
    async fn call_tool(&self, tool: &str, args: Value) -> Result<Value>;
}
