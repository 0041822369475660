//! Authentication errors and their HTTP mapping.

use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::types::UserId;

/// Errors raised by the OAuth flow, the CSRF registry and the middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer credential on a protected request.
    MissingCredential,
    /// Bearer credential rejected upstream, or the identity call failed.
    InvalidCredential,
    /// CSRF state absent, expired or already used.
    InvalidOrExpiredState,
    /// A required query parameter was missing.
    MissingParameter(&'static str),
    /// Upstream answered with `ok: false`; carries the upstream error text.
    UpstreamRejected(String),
    /// Upstream could not be reached or sent an unreadable response.
    UpstreamUnreachable(String),
    /// No credential record stored for this user.
    NotFound(UserId),
}

impl AuthError {
    /// Stable machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::InvalidCredential => "invalid_credential",
            Self::InvalidOrExpiredState => "invalid_or_expired_state",
            Self::MissingParameter(_) => "missing_parameter",
            Self::UpstreamRejected(_) => "upstream_rejected",
            Self::UpstreamUnreachable(_) => "upstream_unreachable",
            Self::NotFound(_) => "not_found",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredential | Self::InvalidCredential => StatusCode::UNAUTHORIZED,
            Self::InvalidOrExpiredState | Self::MissingParameter(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamRejected(_) | Self::UpstreamUnreachable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential => write!(f, "Missing authentication token"),
            Self::InvalidCredential => write!(f, "Invalid authentication token"),
            Self::InvalidOrExpiredState => write!(f, "Invalid or expired state"),
            Self::MissingParameter(name) => write!(f, "Missing required parameter: {}", name),
            Self::UpstreamRejected(msg) => write!(f, "Upstream rejected the request: {}", msg),
            Self::UpstreamUnreachable(msg) => write!(f, "Upstream unreachable: {}", msg),
            Self::NotFound(user_id) => write!(f, "No stored credential for user {}", user_id),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Upstream failure details go to the log, not to the client.
        let message = match &self {
            Self::UpstreamRejected(_) | Self::UpstreamUnreachable(_) => {
                "Authentication failed".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(serde_json::json!({
            "error": self.code(),
            "message": message,
        }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::MissingCredential.to_string(),
            "Missing authentication token"
        );
        assert_eq!(
            AuthError::UpstreamRejected("invalid_code".to_string()).to_string(),
            "Upstream rejected the request: invalid_code"
        );
        assert_eq!(
            AuthError::NotFound(UserId::new("U1")).to_string(),
            "No stored credential for user U1"
        );
    }

    #[test]
    fn test_auth_error_status_mapping() {
        assert_eq!(AuthError::MissingCredential.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::InvalidCredential.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::InvalidOrExpiredState.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AuthError::MissingParameter("code").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::UpstreamUnreachable("timeout".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_upstream_detail_not_in_response() {
        let response =
            AuthError::UpstreamRejected("invalid_client_secret".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "upstream_rejected");
        assert_eq!(body["message"], "Authentication failed");
        assert!(!String::from_utf8_lossy(&bytes).contains("invalid_client_secret"));
    }
}
