//! MCP tools exposed by the gateway.
//!
//! Tools are registered in a [`ToolRegistry`]; adding one does not touch the
//! `ServerHandler` implementation.

mod registry;

pub use registry::{ToolContext, ToolHandler, ToolRegistry};

mod channels_list;

pub use channels_list::{ChannelsListHandler, list_request_from_args};
