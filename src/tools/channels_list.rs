//! Handler for the `channels_list` tool.
//!
//! Lists the caller's conversations through a [`WorkspaceClient`] scoped to
//! their own token, then pages the result with the listing engine.

use std::future::Future;
use std::pin::Pin;

use rmcp::model::{CallToolResult, Content, JsonObject};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::auth::UserIdentity;
use crate::channels::{ChannelPage, ChannelType, DisplaySort, ListRequest, list_channels};
use crate::config::UpstreamEndpoints;
use crate::tools::{ToolContext, ToolHandler};
use crate::workspace::{WorkspaceClient, WorkspaceError};

pub struct ChannelsListHandler {
    endpoints: UpstreamEndpoints,
}

impl ChannelsListHandler {
    pub fn new(endpoints: UpstreamEndpoints) -> Self {
        Self { endpoints }
    }

    /// Fetch and page channels for `identity`.
    pub async fn list_for(
        &self,
        identity: &UserIdentity,
        request: &ListRequest,
    ) -> Result<ChannelPage, WorkspaceError> {
        let client = WorkspaceClient::for_identity(identity, self.endpoints.clone())?;
        let channels = client.list_conversations(&request.types).await?;
        debug!(
            user_id = %identity.user_id(),
            fetched = channels.len(),
            "Listing channels"
        );
        Ok(list_channels(channels, request))
    }
}

/// Read tool arguments into a listing request.
pub fn list_request_from_args(args: &JsonObject) -> ListRequest {
    let types = ChannelType::parse_set(string_arg(args, "channel_types").unwrap_or(""));
    let sort = string_arg(args, "sort")
        .map(DisplaySort::parse)
        .unwrap_or_default();
    let cursor = string_arg(args, "cursor")
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    let limit = match args.get("limit") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as usize,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };

    ListRequest::new(types, cursor, limit, sort)
}

fn string_arg<'a>(args: &'a JsonObject, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn error_result(reason: String) -> CallToolResult {
    let payload = json!({
        "status": "error",
        "reason": reason,
    });
    CallToolResult {
        content: vec![Content::text(payload.to_string())],
        structured_content: None,
        is_error: Some(true),
        meta: None,
    }
}

impl ToolHandler for ChannelsListHandler {
    fn name(&self) -> &str {
        "channels_list"
    }

    fn title(&self) -> Option<&str> {
        Some("List Channels")
    }

    fn description(&self) -> &str {
        "List channels visible to the authenticated user. Results are paged in \
         channel id order; pass `next_cursor` back as `cursor` for the next page."
    }

    fn input_schema(&self) -> JsonObject {
        let mut schema = JsonObject::new();
        schema.insert("type".to_string(), json!("object"));

        let mut properties = serde_json::Map::new();
        properties.insert(
            "channel_types".to_string(),
            json!({
                "type": "string",
                "description": "Comma-separated channel types: public_channel, private_channel, im, mpim. \
                                Defaults to public_channel,private_channel."
            }),
        );
        properties.insert(
            "sort".to_string(),
            json!({
                "type": "string",
                "description": "Display order of the returned page: popularity (member count) or none.",
                "enum": ["popularity", "none"],
                "default": "popularity"
            }),
        );
        properties.insert(
            "cursor".to_string(),
            json!({
                "type": "string",
                "description": "Cursor from a previous call's next_cursor."
            }),
        );
        properties.insert(
            "limit".to_string(),
            json!({
                "type": "integer",
                "description": "Page size (default 100, max 999).",
                "default": 100
            }),
        );

        schema.insert("properties".to_string(), json!(properties));
        schema.insert("required".to_string(), json!([]));
        schema
    }

    fn output_schema(&self) -> Option<JsonObject> {
        let mut schema = JsonObject::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert(
            "description".to_string(),
            json!("One page of channels and the cursor for the next page."),
        );
        Some(schema)
    }

    fn execute(
        &self,
        args: JsonObject,
        ctx: &ToolContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CallToolResult>> + Send + '_>> {
        let identity = ctx.identity.clone();

        Box::pin(async move {
            let Some(identity) = identity else {
                warn!("channels_list called without an authenticated identity");
                return Ok(error_result(
                    "authentication error: user context not found".to_string(),
                ));
            };

            let request = list_request_from_args(&args);
            let page = match self.list_for(&identity, &request).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(user_id = %identity.user_id(), "channels_list failed: {}", e);
                    return Ok(error_result(format!("failed to get channels: {}", e)));
                }
            };

            let payload = serde_json::to_value(&page)?;
            Ok(CallToolResult {
                content: vec![Content::text(payload.to_string())],
                structured_content: Some(payload),
                is_error: None,
                meta: None,
            })
        })
    }
}
