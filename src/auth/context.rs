//! User identity for request-scoped isolation.

use crate::auth::credentials::{BotGrant, CredentialRecord};
use crate::auth::flow::TokenInfo;
use crate::types::{BotUserId, SecretToken, TeamId, UserId};

/// Identity attached to one authenticated request.
///
/// Built fresh by the middleware for every request and inserted into that
/// request's extensions. It is immutable once created and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    user_id: UserId,
    team_id: TeamId,
    /// Token used for upstream calls made on behalf of this user.
    access_token: SecretToken,
    bot: Option<BotGrant>,
}

impl UserIdentity {
    /// Identity backed by a stored credential record.
    ///
    /// The validated IDs and the presented bearer token win over the stored
    /// ones; only the bot grant is taken from the record.
    pub fn from_record(info: TokenInfo, bearer: SecretToken, record: CredentialRecord) -> Self {
        Self {
            user_id: info.user_id,
            team_id: info.team_id,
            access_token: bearer,
            bot: record.bot,
        }
    }

    /// Minimal identity when no stored record exists (e.g. after a restart).
    pub fn from_bearer(info: TokenInfo, bearer: SecretToken) -> Self {
        Self {
            user_id: info.user_id,
            team_id: info.team_id,
            access_token: bearer,
            bot: None,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn team_id(&self) -> &TeamId {
        &self.team_id
    }

    pub fn access_token(&self) -> &SecretToken {
        &self.access_token
    }

    /// Bot token, if a service-identity grant was issued.
    pub fn bot_token(&self) -> Option<&SecretToken> {
        self.bot.as_ref().map(|b| &b.token)
    }

    pub fn bot_user_id(&self) -> Option<&BotUserId> {
        self.bot.as_ref().and_then(|b| b.user_id.as_ref())
    }
}
