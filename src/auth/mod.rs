//! Authentication boundary for the multi-tenant gateway.
//!
//! ## Components
//!
//! - [`CsrfRegistry`]: single-use, time-limited OAuth state tokens
//! - [`OAuthManager`]: authorization URL, code exchange, bearer validation
//! - [`CredentialStore`]: in-memory grants keyed by user ID
//! - [`require_user`]: axum middleware that resolves a [`UserIdentity`]
//!
//! ## Security Model
//!
//! - The state token is consumed before the authorization code is exchanged
//! - Every protected request is validated upstream; nothing is cached
//! - Identities are request-scoped and live only in request extensions
//! - Tokens never appear in logs; only SHA-256 fingerprints do

mod context;
mod credentials;
mod csrf;
mod error;
mod flow;
mod middleware;

pub use context::UserIdentity;
pub use credentials::{BotGrant, CredentialRecord, CredentialStore};
pub use csrf::{CsrfRegistry, STATE_TTL, SWEEP_INTERVAL, VerifiedState};
pub use error::AuthError;
pub use flow::{BOT_SCOPES, OAuthManager, TokenInfo, USER_SCOPES, upstream_client, verify_token};
pub use middleware::{authenticate, bearer_token, require_user, static_identity};
