//! Gateway configuration.
//!
//! Values come from CLI flags with environment fallbacks (see the binary).
//! Everything here is plain data; nothing is persisted.

use std::time::Duration;

use url::Url;

use crate::types::SecretToken;

/// Timeout applied to every upstream HTTP call.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

const SLACK_AUTHORIZE_URL: &str = "https://slack.com/oauth/v2/authorize";
const SLACK_API_BASE: &str = "https://slack.com/api/";

/// Upstream endpoints used by the gateway.
///
/// Defaults point at Slack; tests point them at a local mock server.
#[derive(Debug, Clone)]
pub struct UpstreamEndpoints {
    /// Browser-facing authorization endpoint.
    pub authorize_url: Url,
    /// Base URL for Web API methods (`oauth.v2.access`, `auth.test`, ...).
    /// Must end with a slash.
    pub api_base: Url,
}

impl Default for UpstreamEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: Url::parse(SLACK_AUTHORIZE_URL).expect("static URL is valid"),
            api_base: Url::parse(SLACK_API_BASE).expect("static URL is valid"),
        }
    }
}

impl UpstreamEndpoints {
    /// Build endpoints from an API base, e.g. a mock server URI.
    ///
    /// The authorize URL is derived as `<base>/oauth/v2/authorize`.
    pub fn with_base(base: &str) -> anyhow::Result<Self> {
        let trimmed = base.trim_end_matches('/');
        Ok(Self {
            authorize_url: Url::parse(&format!("{}/oauth/v2/authorize", trimmed))?,
            api_base: Url::parse(&format!("{}/api/", trimmed))?,
        })
    }

    /// Resolve a Web API method name to its URL.
    pub fn method_url(&self, method: &str) -> Result<Url, url::ParseError> {
        self.api_base.join(method)
    }
}

/// OAuth client registration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: SecretToken,
    pub redirect_uri: String,
}

/// How `/mcp` requests are authenticated.
#[derive(Debug, Clone)]
pub enum AuthMode {
    /// Multi-tenant: every request presents its own bearer token.
    OAuth(OAuthConfig),
    /// Legacy single-tenant: one static user token for every request.
    Static(SecretToken),
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub auth: AuthMode,
    pub upstream: UpstreamEndpoints,
}

impl GatewayConfig {
    /// Assemble a config from raw settings, validating the auth mode.
    pub fn from_settings(
        host: String,
        port: u16,
        oauth_enabled: bool,
        client_id: Option<String>,
        client_secret: Option<String>,
        redirect_uri: Option<String>,
        static_token: Option<String>,
    ) -> anyhow::Result<Self> {
        let auth = if oauth_enabled {
            let client_id = non_empty(client_id)
                .ok_or_else(|| anyhow::anyhow!("OAuth enabled but client id is not set"))?;
            let client_secret = non_empty(client_secret)
                .ok_or_else(|| anyhow::anyhow!("OAuth enabled but client secret is not set"))?;
            let redirect_uri = non_empty(redirect_uri)
                .ok_or_else(|| anyhow::anyhow!("OAuth enabled but redirect URI is not set"))?;
            Url::parse(&redirect_uri)
                .map_err(|e| anyhow::anyhow!("Invalid redirect URI `{}`: {}", redirect_uri, e))?;

            AuthMode::OAuth(OAuthConfig {
                client_id,
                client_secret: SecretToken::new(client_secret),
                redirect_uri,
            })
        } else {
            let token = non_empty(static_token).ok_or_else(|| {
                anyhow::anyhow!("OAuth disabled and no static user token configured")
            })?;
            AuthMode::Static(SecretToken::new(token))
        };

        Ok(Self {
            host,
            port,
            auth,
            upstream: UpstreamEndpoints::default(),
        })
    }

    /// Replace the upstream endpoints.
    pub fn with_upstream(mut self, upstream: UpstreamEndpoints) -> Self {
        self.upstream = upstream;
        self
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn oauth_enabled(&self) -> bool {
        matches!(self.auth, AuthMode::OAuth(_))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
