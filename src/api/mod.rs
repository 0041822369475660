//! HTTP endpoints outside the MCP transport: the OAuth bootstrap pair and the
//! liveness check.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, Request, State},
    http::{
        HeaderValue,
        header::{CACHE_CONTROL, PRAGMA, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION},
    },
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};

use crate::auth::{AuthError, CsrfRegistry, OAuthManager};

const MESSAGE_USER_ONLY: &str =
    "Authentication successful! Use this access_token in your MCP client.";
const MESSAGE_WITH_BOT: &str = "Authentication successful! Both user and bot tokens received. \
     Messages will post as bot when post_as_bot=true.";

/// Shared state of the OAuth endpoints.
#[derive(Clone)]
pub struct OAuthState {
    pub manager: Arc<OAuthManager>,
    pub csrf: Arc<CsrfRegistry>,
}

/// `GET /oauth/authorize` and `GET /oauth/callback`.
pub fn oauth_router(state: OAuthState) -> Router {
    Router::new()
        .route("/oauth/authorize", get(authorize))
        .route(
            "/oauth/callback",
            get(callback).layer(middleware::from_fn(no_store)),
        )
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

/// `GET /health`, unauthenticated.
pub fn health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn authorize(State(state): State<OAuthState>) -> Result<Json<Value>, AuthError> {
    let token = state.csrf.issue().await;
    let url = state.manager.build_authorization_url(token.as_str())?;

    Ok(Json(json!({
        "authorization_url": url.as_str(),
        "state": token.as_str(),
    })))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
}

async fn callback(
    State(state): State<OAuthState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<Value>, AuthError> {
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(AuthError::MissingParameter("code"))?;
    let state_token = params
        .state
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::MissingParameter("state"))?;

    // Consumed before the exchange; a failed exchange does not restore it.
    let verified = state
        .csrf
        .redeem(&state_token)
        .await
        .ok_or(AuthError::InvalidOrExpiredState)?;

    let record = state
        .manager
        .exchange_code(&code, verified)
        .await
        .inspect_err(|e| error!("OAuth callback failed: {}", e))?;

    info!(
        user_id = %record.user_id,
        team_id = %record.team_id,
        "User authenticated via OAuth"
    );

    let mut body = Map::new();
    body.insert("access_token".into(), json!(record.access_token.expose()));
    body.insert("user_id".into(), json!(record.user_id.as_str()));
    body.insert("team_id".into(), json!(record.team_id.as_str()));

    match &record.bot {
        Some(bot) => {
            body.insert("bot_token".into(), json!(bot.token.expose()));
            if let Some(bot_user_id) = &bot.user_id {
                body.insert("bot_user_id".into(), json!(bot_user_id.as_str()));
            } else {
                warn!(user_id = %record.user_id, "Bot token granted without bot user id");
            }
            body.insert("message".into(), json!(MESSAGE_WITH_BOT));
        }
        None => {
            body.insert("message".into(), json!(MESSAGE_USER_ONLY));
        }
    }

    Ok(Json(Value::Object(body)))
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    response
}

async fn no_store(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    response
}
