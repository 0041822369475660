//! In-memory credential storage.
//!
//! Credentials live for the lifetime of the process only. A restart forgets
//! every grant; users whose tokens are still valid upstream keep working
//! through the middleware's degraded path.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::auth::error::AuthError;
use crate::types::{BotUserId, SecretToken, TeamId, UserId};

/// Optional service-identity (bot) grant issued alongside a user grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotGrant {
    pub token: SecretToken,
    pub user_id: Option<BotUserId>,
}

/// Result of a successful authorization-code exchange for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub user_id: UserId,
    pub team_id: TeamId,
    /// User-scoped token; every upstream call made for this user uses it.
    pub access_token: SecretToken,
    pub bot: Option<BotGrant>,
    /// Advisory only. Upstream user tokens do not expire.
    pub issued_until: DateTime<Utc>,
}

/// Concurrency-safe map from user ID to credential record.
///
/// Cloning is cheap and every clone shares the same map.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    records: Arc<RwLock<HashMap<UserId, CredentialRecord>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record, fully replacing any previous record for the same user.
    pub async fn store(&self, record: CredentialRecord) {
        let mut records = self.records.write().await;
        let replaced = records.insert(record.user_id.clone(), record).is_some();
        debug!(replaced, total = records.len(), "Stored credential record");
    }

    /// Fetch the record for a user.
    pub async fn get(&self, user_id: &UserId) -> Result<CredentialRecord, AuthError> {
        self.records
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| AuthError::NotFound(user_id.clone()))
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
