//! Per-request workspace API client.
//!
//! A [`WorkspaceClient`] is built for one authenticated request, carries only
//! that request's token, and is dropped when the request ends. Nothing is
//! cached between requests.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::{UserIdentity, upstream_client};
use crate::channels::{Channel, ChannelType};
use crate::config::UpstreamEndpoints;
use crate::types::{ChannelId, SecretToken};

/// Page size requested from `conversations.list`.
const UPSTREAM_PAGE_SIZE: usize = 200;

/// Upper bound on upstream pages fetched per channel type.
pub const MAX_UPSTREAM_PAGES: usize = 100;

/// Error talking to the workspace API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceError {
    /// Transport, status or decode failure.
    Http(String),
    /// The API answered `ok: false`.
    Api(String),
}

impl fmt::Display for WorkspaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(msg) => write!(f, "Workspace API request failed: {}", msg),
            Self::Api(code) => write!(f, "Workspace API error: {}", code),
        }
    }
}

impl std::error::Error for WorkspaceError {}

#[derive(Debug, Deserialize)]
struct ConversationsResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channels: Vec<Conversation>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct Conversation {
    id: String,
    #[serde(default)]
    name: Option<String>,
    /// Counterpart of a direct message.
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    is_im: bool,
    #[serde(default)]
    is_mpim: bool,
    #[serde(default)]
    topic: Option<TextValue>,
    #[serde(default)]
    purpose: Option<TextValue>,
    #[serde(default)]
    num_members: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    #[serde(default)]
    value: String,
}

impl From<Conversation> for Channel {
    fn from(c: Conversation) -> Self {
        let name = if c.is_im {
            format!("@{}", c.user.unwrap_or_default())
        } else {
            format!("#{}", c.name.unwrap_or_default())
        };

        Channel {
            id: ChannelId::new(c.id),
            name,
            topic: c.topic.map(|t| t.value).unwrap_or_default(),
            purpose: c.purpose.map(|p| p.value).unwrap_or_default(),
            member_count: c.num_members.unwrap_or(0),
            is_private: c.is_private,
            is_im: c.is_im,
            is_mpim: c.is_mpim,
        }
    }
}

/// Workspace API client scoped to one user token.
pub struct WorkspaceClient {
    client: reqwest::Client,
    endpoints: UpstreamEndpoints,
    token: SecretToken,
}

impl WorkspaceClient {
    pub fn new(client: reqwest::Client, endpoints: UpstreamEndpoints, token: SecretToken) -> Self {
        Self {
            client,
            endpoints,
            token,
        }
    }

    /// Build a client acting as `identity`, with its own connection pool.
    pub fn for_identity(
        identity: &UserIdentity,
        endpoints: UpstreamEndpoints,
    ) -> Result<Self, WorkspaceError> {
        let client = upstream_client().map_err(|e| WorkspaceError::Http(e.to_string()))?;
        Ok(Self::new(client, endpoints, identity.access_token().clone()))
    }

    /// Fetch every non-archived conversation of the requested types.
    ///
    /// Walks upstream pages until the upstream cursor runs out, repeats, or
    /// [`MAX_UPSTREAM_PAGES`] pages have been read for one type.
    pub async fn list_conversations(
        &self,
        types: &BTreeSet<ChannelType>,
    ) -> Result<Vec<Channel>, WorkspaceError> {
        let mut channels = Vec::new();

        for channel_type in types {
            let mut cursor = String::new();
            let mut seen = HashSet::new();
            for page_number in 1..=MAX_UPSTREAM_PAGES {
                let page = self.conversations_page(*channel_type, &cursor).await?;
                channels.extend(page.channels.into_iter().map(Channel::from));

                let next = match page.response_metadata {
                    Some(meta) if !meta.next_cursor.is_empty() => meta.next_cursor,
                    _ => break,
                };
                if !seen.insert(next.clone()) {
                    warn!(channel_type = %channel_type, "Upstream cursor repeated, stopping");
                    break;
                }
                if page_number == MAX_UPSTREAM_PAGES {
                    warn!(
                        channel_type = %channel_type,
                        pages = MAX_UPSTREAM_PAGES,
                        "Upstream page limit reached, listing truncated"
                    );
                    break;
                }
                cursor = next;
            }
        }

        debug!(
            token = %self.token.fingerprint(),
            count = channels.len(),
            "Fetched conversations"
        );
        Ok(channels)
    }

    async fn conversations_page(
        &self,
        channel_type: ChannelType,
        cursor: &str,
    ) -> Result<ConversationsResponse, WorkspaceError> {
        let url = self
            .endpoints
            .method_url("conversations.list")
            .map_err(|e| WorkspaceError::Http(e.to_string()))?;

        let limit = UPSTREAM_PAGE_SIZE.to_string();
        let mut form = vec![
            ("types", channel_type.as_str()),
            ("exclude_archived", "true"),
            ("limit", limit.as_str()),
        ];
        if !cursor.is_empty() {
            form.push(("cursor", cursor));
        }

        let response = self
            .client
            .post(url)
            .bearer_auth(self.token.expose())
            .form(&form)
            .send()
            .await
            .map_err(|e| WorkspaceError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkspaceError::Http(format!("HTTP {}", status)));
        }

        let page: ConversationsResponse = response
            .json()
            .await
            .map_err(|e| WorkspaceError::Http(format!("failed to decode response: {}", e)))?;

        if !page.ok {
            let code = page.error.unwrap_or_else(|| "unknown_error".to_string());
            warn!(
                token = %self.token.fingerprint(),
                channel_type = %channel_type,
                error = %code,
                "conversations.list rejected"
            );
            return Err(WorkspaceError::Api(code));
        }

        Ok(page)
    }
}
