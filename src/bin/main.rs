use anyhow::Result;
use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use slack_mcp_gateway::{GatewayConfig, create_gateway, serve};

#[derive(Parser)]
#[command(name = "slack-mcp-gateway")]
#[command(about = "Multi-tenant MCP gateway for a Slack workspace")]
struct Cli {
    /// Bind host
    #[arg(long, env = "SLACK_MCP_HOST", default_value = "127.0.0.1")]
    host: String,
    /// Bind port
    #[arg(long, env = "SLACK_MCP_PORT", default_value_t = 13080)]
    port: u16,
    /// Enable multi-user OAuth mode
    #[arg(long, env = "SLACK_MCP_OAUTH_ENABLED", default_value_t = false)]
    oauth_enabled: bool,
    /// OAuth client ID
    #[arg(long, env = "SLACK_MCP_CLIENT_ID")]
    client_id: Option<String>,
    /// OAuth client secret
    #[arg(long, env = "SLACK_MCP_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,
    /// OAuth redirect URI, e.g. https://gateway.example.com/oauth/callback
    #[arg(long, env = "SLACK_MCP_REDIRECT_URI")]
    redirect_uri: Option<String>,
    /// User token for legacy single-user mode
    #[arg(long, env = "SLACK_MCP_XOXP_TOKEN", hide_env_values = true)]
    xoxp_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("slack_mcp_gateway=info".parse()?)
                .add_directive("rmcp=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    let config = GatewayConfig::from_settings(
        cli.host,
        cli.port,
        cli.oauth_enabled,
        cli.client_id,
        cli.client_secret,
        cli.redirect_uri,
        cli.xoxp_token,
    )?;

    info!(
        bind = %config.bind_addr(),
        oauth = config.oauth_enabled(),
        "Starting gateway"
    );

    let gateway = create_gateway(&config).await?;

    serve(gateway.router.clone(), &config.bind_addr(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    })
    .await
    .inspect_err(|e| tracing::error!("serving error: {:?}", e))?;

    gateway.shutdown();
    info!("Gateway stopped");

    Ok(())
}
