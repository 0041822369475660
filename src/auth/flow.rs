//! OAuth 2.0 authorization-code flow against the workspace identity provider.
//!
//! The manager builds the browser authorization URL, exchanges codes for
//! tokens, validates bearer tokens on every request and records grants in
//! the [`CredentialStore`]. It never holds a lock across an upstream call.

use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::credentials::{BotGrant, CredentialRecord, CredentialStore};
use crate::auth::csrf::VerifiedState;
use crate::auth::error::AuthError;
use crate::config::{OAuthConfig, UPSTREAM_TIMEOUT, UpstreamEndpoints};
use crate::types::{BotUserId, SecretToken, TeamId, UserId};

/// Scopes requested for the acting-as-user token.
pub const USER_SCOPES: &[&str] = &[
    "channels:history",
    "channels:read",
    "groups:history",
    "groups:read",
    "im:history",
    "im:read",
    "im:write",
    "mpim:history",
    "mpim:read",
    "mpim:write",
    "users:read",
    "chat:write",
    "search:read",
];

/// Scopes requested for the optional bot token.
pub const BOT_SCOPES: &[&str] = &[
    "channels:history",
    "channels:read",
    "groups:history",
    "groups:read",
    "im:history",
    "im:read",
    "im:write",
    "mpim:history",
    "mpim:read",
    "mpim:write",
    "users:read",
    "chat:write",
];

/// Advisory lifetime recorded on each grant.
const ADVISORY_GRANT_DAYS: i64 = 365;

/// Identity confirmed by the upstream `auth.test` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub user_id: UserId,
    pub team_id: TeamId,
}

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    /// Bot token, present when bot scopes were granted.
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    authed_user: Option<AuthedUser>,
    #[serde(default)]
    bot_user_id: Option<String>,
    #[serde(default)]
    team: Option<Team>,
}

#[derive(Debug, Deserialize)]
struct AuthedUser {
    id: String,
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Team {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    team_id: Option<String>,
}

/// Build the shared HTTP client for upstream calls.
pub fn upstream_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(UPSTREAM_TIMEOUT).build()
}

/// Ask the upstream identity endpoint who owns `token`.
///
/// Network failures and upstream rejections both surface as
/// [`AuthError::InvalidCredential`].
pub async fn verify_token(
    client: &reqwest::Client,
    endpoints: &UpstreamEndpoints,
    token: &SecretToken,
) -> Result<TokenInfo, AuthError> {
    if token.expose().is_empty() {
        return Err(AuthError::InvalidCredential);
    }

    let url = endpoints
        .method_url("auth.test")
        .map_err(|_| AuthError::InvalidCredential)?;

    let response = client
        .post(url)
        .bearer_auth(token.expose())
        .header(
            reqwest::header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        )
        .send()
        .await
        .map_err(|e| {
            warn!(token = %token.fingerprint(), "Identity check failed: {}", e);
            AuthError::InvalidCredential
        })?;

    let result: AuthTestResponse = response.json().await.map_err(|e| {
        warn!(token = %token.fingerprint(), "Unreadable identity response: {}", e);
        AuthError::InvalidCredential
    })?;

    if !result.ok {
        warn!(
            token = %token.fingerprint(),
            error = result.error.as_deref().unwrap_or("unknown"),
            "Upstream rejected bearer token"
        );
        return Err(AuthError::InvalidCredential);
    }

    match (result.user_id, result.team_id) {
        (Some(user_id), Some(team_id)) if !user_id.is_empty() => Ok(TokenInfo {
            user_id: UserId::new(user_id),
            team_id: TeamId::new(team_id),
        }),
        _ => {
            warn!(token = %token.fingerprint(), "Identity response without user or team");
            Err(AuthError::InvalidCredential)
        }
    }
}

/// Drives the OAuth flow and owns credential writes.
pub struct OAuthManager {
    config: OAuthConfig,
    endpoints: UpstreamEndpoints,
    store: CredentialStore,
    client: reqwest::Client,
}

impl OAuthManager {
    /// Create a manager writing into `store`.
    pub fn new(
        config: OAuthConfig,
        endpoints: UpstreamEndpoints,
        store: CredentialStore,
        client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            endpoints,
            store,
            client,
        }
    }

    /// The credential store this manager writes into.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Build the browser authorization URL for `state`.
    ///
    /// Pure: the same state always yields the same URL. The caller is
    /// responsible for the state being unique and unpredictable.
    pub fn build_authorization_url(&self, state: &str) -> Result<Url, AuthError> {
        if state.is_empty() {
            return Err(AuthError::InvalidOrExpiredState);
        }

        let mut url = self.endpoints.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("scope", &BOT_SCOPES.join(","))
            .append_pair("user_scope", &USER_SCOPES.join(","))
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("state", state);

        Ok(url)
    }

    /// Exchange an authorization code for tokens and store the grant.
    ///
    /// Requires a [`VerifiedState`], so the CSRF state has already been
    /// consumed by the time the code reaches the upstream.
    pub async fn exchange_code(
        &self,
        code: &str,
        state: VerifiedState,
    ) -> Result<CredentialRecord, AuthError> {
        debug!(
            state = %crate::types::token_fingerprint(state.token().as_str()),
            "Exchanging authorization code"
        );

        let url = self
            .endpoints
            .method_url("oauth.v2.access")
            .map_err(|e| AuthError::UpstreamUnreachable(e.to_string()))?;

        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::UpstreamUnreachable(format!("failed to exchange code: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::UpstreamRejected(format!(
                "HTTP {} from token endpoint",
                status
            )));
        }

        let result: TokenExchangeResponse = response.json().await.map_err(|e| {
            AuthError::UpstreamUnreachable(format!("failed to decode response: {}", e))
        })?;

        let record = Self::record_from_exchange(result)?;
        self.store.store(record.clone()).await;

        info!(
            user_id = %record.user_id,
            team_id = %record.team_id,
            bot_grant = record.bot.is_some(),
            "Stored OAuth grant"
        );

        Ok(record)
    }

    fn record_from_exchange(
        result: TokenExchangeResponse,
    ) -> Result<CredentialRecord, AuthError> {
        if !result.ok {
            return Err(AuthError::UpstreamRejected(
                result.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }

        let authed_user = result
            .authed_user
            .ok_or_else(|| AuthError::UpstreamRejected("missing authed_user".to_string()))?;
        let access_token = authed_user
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::UpstreamRejected("missing user token".to_string()))?;
        let team = result
            .team
            .ok_or_else(|| AuthError::UpstreamRejected("missing team".to_string()))?;

        let bot = result
            .access_token
            .filter(|t| !t.is_empty())
            .map(|token| BotGrant {
                token: SecretToken::new(token),
                user_id: result
                    .bot_user_id
                    .filter(|id| !id.is_empty())
                    .map(BotUserId::new),
            });

        Ok(CredentialRecord {
            user_id: UserId::new(authed_user.id),
            team_id: TeamId::new(team.id),
            access_token: SecretToken::new(access_token),
            bot,
            issued_until: chrono::Utc::now() + chrono::Duration::days(ADVISORY_GRANT_DAYS),
        })
    }

    /// Validate a bearer token against the upstream identity endpoint.
    ///
    /// Not cached: revocations upstream take effect on the next request.
    pub async fn validate_bearer(&self, token: &SecretToken) -> Result<TokenInfo, AuthError> {
        verify_token(&self.client, &self.endpoints, token).await
    }

    /// Fetch the stored grant for `user_id`.
    pub async fn lookup_stored(&self, user_id: &UserId) -> Result<CredentialRecord, AuthError> {
        self.store.get(user_id).await
    }
}
