//! Tool registry for the gateway's MCP tools.
//!
//! Each tool implements [`ToolHandler`]; the server looks handlers up by name
//! and hands them a [`ToolContext`] carrying the caller's identity.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rmcp::RoleServer;
use rmcp::model::{CallToolResult, JsonObject, Tool as McpTool};
use rmcp::service::RequestContext;

use crate::auth::UserIdentity;

/// HTTP request parts stored by rmcp in the request extensions.
type HttpParts = http::request::Parts;

/// Context passed to tool handlers during execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Identity resolved by the authentication middleware for this request.
    pub identity: Option<UserIdentity>,
}

impl ToolContext {
    /// Build a context from an rmcp request.
    ///
    /// The identity is read from the HTTP parts of the request that carried
    /// this call, where the auth middleware put it.
    pub fn from_request(request_context: &RequestContext<RoleServer>) -> Self {
        let identity = request_context
            .extensions
            .get::<HttpParts>()
            .and_then(|parts| parts.extensions.get::<UserIdentity>())
            .cloned();

        Self { identity }
    }

    /// Context for direct invocation outside an MCP session.
    pub fn with_identity(identity: Option<UserIdentity>) -> Self {
        Self { identity }
    }
}

/// Trait for handling MCP tool invocations.
pub trait ToolHandler: Send + Sync {
    /// Returns the tool's name (e.g., "channels_list").
    fn name(&self) -> &str;

    fn title(&self) -> Option<&str> {
        None
    }

    fn description(&self) -> &str;

    /// Returns the input schema for this tool.
    fn input_schema(&self) -> JsonObject;

    fn output_schema(&self) -> Option<JsonObject> {
        None
    }

    /// Executes the tool with the given arguments.
    fn execute(
        &self,
        args: JsonObject,
        ctx: &ToolContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CallToolResult>> + Send + '_>>;

    /// Converts this handler to an `McpTool` for use in `list_tools`.
    fn to_mcp_tool(&self) -> McpTool {
        McpTool {
            name: Cow::Owned(self.name().to_string()),
            title: self.title().map(|s| s.to_string()),
            description: Some(Cow::Owned(self.description().to_string())),
            input_schema: Arc::new(self.input_schema()),
            output_schema: self.output_schema().map(Arc::new),
            annotations: None,
            icons: None,
            meta: None,
        }
    }
}

/// Registry of tool handlers, ordered by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: BTreeMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool handler.
    pub fn register_handler<T: ToolHandler + 'static>(mut self, handler: T) -> Self {
        self.handlers
            .insert(handler.name().to_string(), Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    /// All registered tools, sorted by name.
    pub fn list_tools(&self) -> Vec<McpTool> {
        self.handlers
            .values()
            .map(|handler| handler.to_mcp_tool())
            .collect()
    }

    /// Execute a tool by name with the given arguments.
    pub async fn call_tool(
        &self,
        name: &str,
        args: JsonObject,
        ctx: &ToolContext,
    ) -> anyhow::Result<CallToolResult> {
        let handler = self
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Tool not found: {}", name))?;
        handler.execute(args, ctx).await
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::Content;
    use serde_json::json;

    struct EchoTool;

    impl ToolHandler for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the caller's user id"
        }

        fn input_schema(&self) -> JsonObject {
            let mut schema = JsonObject::new();
            schema.insert("type".to_string(), json!("object"));
            schema
        }

        fn execute(
            &self,
            _args: JsonObject,
            ctx: &ToolContext,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<CallToolResult>> + Send + '_>> {
            let user = ctx
                .identity
                .as_ref()
                .map(|i| i.user_id().to_string())
                .unwrap_or_else(|| "anonymous".to_string());
            Box::pin(async move {
                Ok(CallToolResult {
                    content: vec![Content::text(user)],
                    structured_content: None,
                    is_error: None,
                    meta: None,
                })
            })
        }
    }

    #[tokio::test]
    async fn test_register_and_call() {
        let registry = ToolRegistry::new().register_handler(EchoTool);
        assert!(registry.contains("echo"));
        assert_eq!(registry.len(), 1);

        let tools = registry.list_tools();
        assert_eq!(tools[0].name, "echo");
        assert_eq!(tools[0].description.as_deref(), Some("Echo the caller's user id"));

        let result = registry
            .call_tool("echo", JsonObject::new(), &ToolContext::with_identity(None))
            .await
            .unwrap();
        assert!(result.is_error.is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        let err = registry
            .call_tool("missing", JsonObject::new(), &ToolContext::with_identity(None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
