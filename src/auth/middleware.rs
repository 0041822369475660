//! Authentication middleware for protected routes.
//!
//! Every request is validated upstream; nothing is cached per connection.
//! The resolved [`UserIdentity`] is inserted into the request extensions,
//! where handlers (and rmcp, via the HTTP request parts) pick it up.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::auth::context::UserIdentity;
use crate::auth::error::AuthError;
use crate::auth::flow::OAuthManager;
use crate::types::SecretToken;

const BEARER_PREFIX: &str = "bearer ";

/// Extract the bearer credential from request headers.
///
/// The `Bearer ` scheme prefix is optional and matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Result<SecretToken, AuthError> {
    let raw = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .ok_or(AuthError::MissingCredential)?;

    let token = match raw.get(..BEARER_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(BEARER_PREFIX) => &raw[BEARER_PREFIX.len()..],
        _ => raw,
    }
    .trim();

    if token.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    Ok(SecretToken::new(token))
}

/// Resolve the identity behind `headers`.
///
/// Steps run strictly in order and each is a hard gate: extract, validate
/// upstream, look up the stored grant (degrading to a bearer-only identity
/// when the store has no record).
pub async fn authenticate(
    manager: &OAuthManager,
    headers: &HeaderMap,
) -> Result<UserIdentity, AuthError> {
    let token = bearer_token(headers).inspect_err(|_| {
        warn!("Missing auth token in OAuth mode");
    })?;

    let info = manager.validate_bearer(&token).await?;

    let identity = match manager.lookup_stored(&info.user_id).await {
        Ok(record) => UserIdentity::from_record(info, token, record),
        Err(e) => {
            warn!(user_id = %info.user_id, "Stored credential unavailable, using bearer only: {}", e);
            UserIdentity::from_bearer(info, token)
        }
    };

    debug!(
        user_id = %identity.user_id(),
        team_id = %identity.team_id(),
        "Authenticated user"
    );
    Ok(identity)
}

/// Axum middleware requiring a valid bearer credential.
pub async fn require_user(
    State(manager): State<Arc<OAuthManager>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = authenticate(&manager, request.headers()).await?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Axum middleware for legacy single-tenant mode.
///
/// Attaches the identity resolved at startup from the static token.
pub async fn static_identity(
    State(identity): State<Arc<UserIdentity>>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(identity.as_ref().clone());
    next.run(request).await
}
