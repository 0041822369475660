// Core modules
pub mod api;
pub mod auth;
pub mod channels;
pub mod config;
pub mod server;
pub mod tools;
pub mod types;
pub mod workspace;

pub use auth::{AuthError, CredentialStore, CsrfRegistry, OAuthManager, UserIdentity};
pub use channels::{Channel, ChannelPage, ChannelType, DisplaySort, ListRequest, list_channels};
pub use config::{AuthMode, GatewayConfig, OAuthConfig, UpstreamEndpoints};
pub use server::{Authentication, GatewayMcpServer, build_router, serve};
pub use tools::{ChannelsListHandler, ToolHandler, ToolRegistry};

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tracing::info;

/// Fully wired gateway: router plus the state it owns.
pub struct Gateway {
    pub router: Router,
    pub authentication: Authentication,
}

impl Gateway {
    /// Stop background work. The router keeps serving until dropped.
    pub fn shutdown(&self) {
        if let Authentication::OAuth { csrf, .. } = &self.authentication {
            csrf.shutdown();
        }
    }
}

/// Build the gateway for `config`.
///
/// In OAuth mode this creates a fresh credential store and CSRF registry. In
/// legacy mode the static token is validated once, here, and the resulting
/// identity is attached to every `/mcp` request.
pub async fn create_gateway(config: &GatewayConfig) -> Result<Gateway> {
    let client = auth::upstream_client().context("failed to build HTTP client")?;

    let authentication = match &config.auth {
        AuthMode::OAuth(oauth) => {
            let manager = OAuthManager::new(
                oauth.clone(),
                config.upstream.clone(),
                CredentialStore::new(),
                client,
            );
            info!(client_id = %oauth.client_id, "OAuth mode enabled");
            Authentication::OAuth {
                manager: Arc::new(manager),
                csrf: Arc::new(CsrfRegistry::new()),
            }
        }
        AuthMode::Static(token) => {
            let info = auth::verify_token(&client, &config.upstream, token)
                .await
                .map_err(|e| anyhow::anyhow!("static token rejected: {}", e))?;
            info!(
                user_id = %info.user_id,
                team_id = %info.team_id,
                "Legacy single-user mode"
            );
            Authentication::Static(Arc::new(UserIdentity::from_bearer(info, token.clone())))
        }
    };

    let tool_registry = Arc::new(
        ToolRegistry::new().register_handler(ChannelsListHandler::new(config.upstream.clone())),
    );

    let router = build_router(&authentication, tool_registry);

    Ok(Gateway {
        router,
        authentication,
    })
}
