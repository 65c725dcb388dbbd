//! Wire types exchanged during the `initialize` handshake and over
//! `tools/list`, `tools/call`, `resources/*`, and `prompts/*`.
//!
//! These mirror the shapes a client and server agree on independent of
//! transport; [`crate::frame`] carries them as the `params`/`result`
//! payload of a [`crate::frame::Frame`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version this crate speaks, advertised by both sides during
/// `initialize`.
pub use crate::config::defaults::PROTOCOL_VERSION;

/// Identifies the connecting client during `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientInfo {
    /// Client application name.
    pub name: String,
    /// Client application version.
    pub version: String,
}

/// Capabilities a client declares it supports. Currently advisory: the
/// server does not gate behavior on these fields, but echoes them back
/// is not required either.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientCapabilities {
    /// Non-standard extension fields, preserved but unused.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Parameters of an `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeParams {
    /// Highest protocol version the client supports.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Client capability flags.
    pub capabilities: ClientCapabilities,
    /// Client identity.
    #[serde(rename = "clientInfo")]
    pub client_info: ClientInfo,
}

/// Identifies the server during `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server application name.
    pub name: String,
    /// Server application version.
    pub version: String,
}

/// Whether the tools capability supports change notifications. This
/// crate does not emit `tools/list_changed`, so this is always `false`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsCapability {
    /// Whether `notifications/tools/list_changed` will be sent.
    #[serde(rename = "listChanged", default)]
    pub list_changed: bool,
}

/// Whether the resources capability supports subscriptions or change
/// notifications. Neither is implemented; both are always `false`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResourcesCapability {
    /// Whether `resources/subscribe` is supported.
    #[serde(default)]
    pub subscribe: bool,
    /// Whether `notifications/resources/list_changed` will be sent.
    #[serde(rename = "listChanged", default)]
    pub list_changed: bool,
}

/// Whether the prompts capability supports change notifications.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptsCapability {
    /// Whether `notifications/prompts/list_changed` will be sent.
    #[serde(rename = "listChanged", default)]
    pub list_changed: bool,
}

/// Capabilities a server advertises in its `initialize` response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Present when at least one tool is registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    /// Present when at least one resource is registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    /// Present when at least one prompt is registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
}

/// Result of a successful `initialize` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Protocol version the server will speak for this session.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capability flags.
    pub capabilities: ServerCapabilities,
    /// Server identity.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    /// Optional free-text instructions for the client/model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// A tool's advertised shape, returned from `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name, used as the `tools/call` key.
    pub name: String,
    /// Human-readable description shown to the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema describing the tool's expected arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResult {
    /// The registered tools, in registration order.
    pub tools: Vec<ToolDescriptor>,
}

/// Parameters of a `tools/call` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments passed to the tool, validated against its input schema.
    #[serde(default)]
    pub arguments: Value,
}

/// One piece of content returned by a tool, resource, or prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text itself.
        text: String,
    },
    /// Base64-encoded binary content (e.g. an image).
    Image {
        /// Base64-encoded bytes.
        data: String,
        /// IANA media type, e.g. `image/png`.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// A reference to (or inline copy of) a resource.
    Resource {
        /// Resource URI.
        uri: String,
        /// Inline text, when the resource is text-based and small.
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// IANA media type of the resource.
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
}

impl ContentBlock {
    /// Build a text content block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The block's text, if it's a [`ContentBlock::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Result of `tools/call`. A tool's own failure is represented by
/// `is_error: true` with a descriptive text block, not a JSON-RPC
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Content blocks produced by the tool.
    pub content: Vec<ContentBlock>,
    /// Whether the tool call represents a business-logic failure.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Build a successful result from a single text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self { content: vec![ContentBlock::text(text)], is_error: false }
    }

    /// Build an error result (`isError: true`) from a single text block.
    #[must_use]
    pub fn error_text(text: impl Into<String>) -> Self {
        Self { content: vec![ContentBlock::text(text)], is_error: true }
    }
}

/// A resource's advertised shape, returned from `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Unique resource URI, used as the `resources/read` key.
    pub uri: String,
    /// Human-readable name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// IANA media type of the resource's content.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Result of `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesListResult {
    /// The registered resources, in registration order.
    pub resources: Vec<ResourceDescriptor>,
}

/// Parameters of a `resources/read` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReadParams {
    /// URI of the resource to read.
    pub uri: String,
}

/// The body of a resource, returned from `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceContent {
    /// URI this content was read from.
    pub uri: String,
    /// IANA media type.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Inline text, for text-based resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64-encoded bytes, for binary resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

/// Result of `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReadResult {
    /// The resource's content, one entry per contiguous representation.
    pub contents: Vec<ResourceContent>,
}

/// A single named argument a prompt accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be supplied.
    #[serde(default)]
    pub required: bool,
}

/// A prompt's advertised shape, returned from `prompts/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDescriptor {
    /// Unique prompt name, used as the `prompts/get` key.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Arguments the prompt template accepts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<PromptArgument>,
}

/// Result of `prompts/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsListResult {
    /// The registered prompts, in registration order.
    pub prompts: Vec<PromptDescriptor>,
}

/// Parameters of a `prompts/get` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptGetParams {
    /// Name of the prompt to render.
    pub name: String,
    /// Template arguments, validated against the prompt's declared
    /// argument list.
    #[serde(default)]
    pub arguments: HashMap<String, String>,
}

/// Who authored a rendered prompt message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    /// The end user.
    User,
    /// The model itself.
    Assistant,
}

/// One message in a rendered prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Who this message is attributed to.
    pub role: PromptRole,
    /// The message content.
    pub content: ContentBlock,
}

/// Result of `prompts/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptGetResult {
    /// Description of the rendered prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The rendered message sequence.
    pub messages: Vec<PromptMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_block_text_round_trips() {
        let block = ContentBlock::text("hello");
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value, json!({"type": "text", "text": "hello"}));
        let back: ContentBlock = serde_json::from_value(value).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn content_block_image_round_trips() {
        let block = ContentBlock::Image { data: "YWJj".into(), mime_type: "image/png".into() };
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value, json!({"type": "image", "data": "YWJj", "mimeType": "image/png"}));
    }

    #[test]
    fn tool_call_result_error_sets_flag() {
        let result = ToolCallResult::error_text("bad input");
        assert!(result.is_error);
        assert_eq!(result.content[0].as_text(), Some("bad input"));
    }

    #[test]
    fn initialize_params_deserializes_camel_case() {
        let value = json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0"}
        });
        let params: InitializeParams = serde_json::from_value(value).unwrap();
        assert_eq!(params.protocol_version, "2024-11-05");
        assert_eq!(params.client_info.name, "test-client");
    }

    #[test]
    fn server_capabilities_omit_absent_sections() {
        let caps = ServerCapabilities { tools: Some(ToolsCapability::default()), resources: None, prompts: None };
        let value = serde_json::to_value(&caps).unwrap();
        assert!(value.get("tools").is_some());
        assert!(value.get("resources").is_none());
        assert!(value.get("prompts").is_none());
    }
}
