//! MCP server and HTTP router.
//!
//! `/mcp` is rmcp's streamable HTTP service behind the authentication
//! middleware. The OAuth endpoints are mounted only in OAuth mode.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::middleware::from_fn_with_state;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::*,
    service::{RequestContext, RoleServer},
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::api::{self, OAuthState};
use crate::auth::{CsrfRegistry, OAuthManager, UserIdentity, require_user, static_identity};
use crate::tools::{ToolContext, ToolRegistry};

/// How `/mcp` requests get their identity.
#[derive(Clone)]
pub enum Authentication {
    /// Every request validates its own bearer token.
    OAuth {
        manager: Arc<OAuthManager>,
        csrf: Arc<CsrfRegistry>,
    },
    /// Every request gets the identity resolved at startup.
    Static(Arc<UserIdentity>),
}

/// MCP server that delegates tool calls to the registry.
#[derive(Clone)]
pub struct GatewayMcpServer {
    tool_registry: Arc<ToolRegistry>,
}

impl GatewayMcpServer {
    pub fn new(tool_registry: Arc<ToolRegistry>) -> Self {
        Self { tool_registry }
    }

    pub fn tool_registry(&self) -> &Arc<ToolRegistry> {
        &self.tool_registry
    }
}

impl ServerHandler for GatewayMcpServer {
    fn ping(
        &self,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<(), McpError>> + Send + '_ {
        std::future::ready(Ok(()))
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let result = ListToolsResult {
            tools: self.tool_registry.list_tools(),
            next_cursor: None,
            ..Default::default()
        };
        std::future::ready(Ok(result))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        let tool_name = request.name.to_string();
        let args = request.arguments.unwrap_or_default();
        let registry = self.tool_registry.clone();

        async move {
            if !registry.contains(&tool_name) {
                return Err(McpError::invalid_params(
                    format!("Tool not found: {}", tool_name),
                    None,
                ));
            }

            let ctx = ToolContext::from_request(&context);
            debug!(
                tool = %tool_name,
                user_id = ?ctx.identity.as_ref().map(|i| i.user_id().to_string()),
                "Calling tool"
            );

            registry
                .call_tool(&tool_name, args, &ctx)
                .await
                .map_err(|e| McpError::internal_error(format!("Tool execution failed: {}", e), None))
        }
    }

    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Workspace gateway. Every call acts as the user whose token authenticated \
                 the request."
                    .to_string(),
            ),
        }
    }
}

/// Build the complete HTTP router.
pub fn build_router(auth: &Authentication, tool_registry: Arc<ToolRegistry>) -> Router {
    let service = StreamableHttpService::new(
        move || Ok(GatewayMcpServer::new(tool_registry.clone())),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let mcp = Router::new().nest_service("/mcp", service);
    let mcp = match auth {
        Authentication::OAuth { manager, .. } => {
            mcp.layer(from_fn_with_state(manager.clone(), require_user))
        }
        Authentication::Static(identity) => {
            mcp.layer(from_fn_with_state(identity.clone(), static_identity))
        }
    };

    let mut router = Router::new().merge(api::health_router()).merge(mcp);
    if let Authentication::OAuth { manager, csrf } = auth {
        router = router.merge(api::oauth_router(OAuthState {
            manager: manager.clone(),
            csrf: csrf.clone(),
        }));
    }

    router.layer(TraceLayer::new_for_http())
}

/// Serve `router` on `bind` until `shutdown` resolves.
pub async fn serve(
    router: Router,
    bind: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Gateway listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
