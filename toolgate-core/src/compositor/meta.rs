//! The compositor's own administrative surface, as a mountable backend.
//!
//! Mounting this (gated) makes live reconfiguration flow through the same
//! dispatch path as every other tool call: unmounting a backend or
//! clearing a pin is auditable and deniable by the approval policy.
//! Mounting new backends is not exposed here: backends are live objects
//! wired up by the embedding process, not values a JSON call can conjure.

use std::sync::{Arc, Weak};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::backend::{ToolBackend, ToolSpec};

use super::{Compositor, MountPrefix};

/// Tool surface over one compositor.
///
/// Holds a weak reference: the meta backend is mounted on the compositor
/// it administers, and must not keep it alive on its own.
pub struct CompositorMetaBackend {
    compositor: Weak<Compositor>,
}

impl CompositorMetaBackend {
    pub fn new(compositor: &Arc<Compositor>) -> Self {
        Self {
            compositor: Arc::downgrade(compositor),
        }
    }

    fn compositor(&self) -> Result<Arc<Compositor>> {
        self.compositor
            .upgrade()
            .context("compositor is shutting down")
    }
}

#[derive(Debug, Deserialize)]
struct PrefixArgs {
    prefix: MountPrefix,
}

#[async_trait]
impl ToolBackend for CompositorMetaBackend {
    fn tools(&self) -> Vec<ToolSpec> {
        let prefix_schema = json!({
            "type": "object",
            "properties": {"prefix": {"type": "string", "description": "Mount prefix"}},
            "required": ["prefix"]
        });
        vec![
            ToolSpec::new(
                "entries",
                "List mounted backends and their pin/gate state",
                json!({"type": "object", "properties": {}}),
            ),
            ToolSpec::new(
                "list_tools",
                "List every reachable tool with its qualified name",
                json!({"type": "object", "properties": {}}),
            ),
            ToolSpec::new(
                "unmount",
                "Remove the backend mounted at a prefix (fails on pinned mounts)",
                prefix_schema.clone(),
            ),
            ToolSpec::new(
                "unpin",
                "Clear the pin on a mount so it becomes unmountable",
                prefix_schema,
            ),
        ]
    }

    async fn call_tool(&self, tool: &str, args: Value) -> Result<Value> {
        let compositor = self.compositor()?;
        match tool {
            "entries" => Ok(json!({"entries": compositor.entries().await})),
            "list_tools" => Ok(json!({"tools": compositor.tool_specs().await})),
            "unmount" => {
                let input: PrefixArgs =
                    serde_json::from_value(args).context("invalid unmount arguments")?;
                compositor.unmount(&input.prefix).await?;
                Ok(json!({"unmounted": input.prefix}))
            }
            "unpin" => {
                let input: PrefixArgs =
                    serde_json::from_value(args).context("invalid unpin arguments")?;
                compositor.unpin(&input.prefix).await?;
                Ok(json!({"unpinned": input.prefix}))
            }
            other => bail!("unknown tool '{other}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::compositor::MountOptions;

    struct NoopBackend;

    #[async_trait]
    impl ToolBackend for NoopBackend {
        fn tools(&self) -> Vec<ToolSpec> {
            vec![ToolSpec::new("noop", "does nothing", json!({"type": "object"}))]
        }

        async fn call_tool(&self, _tool: &str, _args: Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    async fn compositor_with_meta() -> Arc<Compositor> {
        let compositor = Arc::new(Compositor::new());
        let meta = CompositorMetaBackend::new(&compositor);
        compositor
            .mount(
                MountPrefix::new("gateway").unwrap(),
                Arc::new(meta),
                MountOptions::default().pinned(true),
            )
            .await
            .unwrap();
        compositor
    }

    #[tokio::test]
    async fn admin_operations_dispatch_as_tool_calls() {
        let compositor = compositor_with_meta().await;
        compositor
            .mount(
                MountPrefix::new("backend").unwrap(),
                Arc::new(NoopBackend),
                MountOptions::default().pinned(true),
            )
            .await
            .unwrap();

        let entries = compositor
            .dispatch("gateway__entries", json!({}))
            .await
            .unwrap();
        let listed: Vec<&str> = entries["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["prefix"].as_str().unwrap())
            .collect();
        assert_eq!(listed, ["backend", "gateway"]);

        // Pinned: unmount through the tool surface fails like the direct call.
        let err = compositor
            .dispatch("gateway__unmount", json!({"prefix": "backend"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("pinned"));

        compositor
            .dispatch("gateway__unpin", json!({"prefix": "backend"}))
            .await
            .unwrap();
        compositor
            .dispatch("gateway__unmount", json!({"prefix": "backend"}))
            .await
            .unwrap();

        let tools = compositor
            .dispatch("gateway__list_tools", json!({}))
            .await
            .unwrap();
        let names: Vec<&str> = tools["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|tool| tool["name"].as_str().unwrap())
            .collect();
        assert!(!names.contains(&"backend__noop"));
        assert!(names.contains(&"gateway__entries"));
    }

    #[tokio::test]
    async fn invalid_prefix_argument_is_a_backend_error() {
        let compositor = compositor_with_meta().await;
        let err = compositor
            .dispatch("gateway__unmount", json!({"prefix": "Not Valid"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid unmount arguments"));
    }
}
