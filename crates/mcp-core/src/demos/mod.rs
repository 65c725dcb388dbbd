//! Reference tools/resources/prompts used by the `mcp-core-demo` binary
//! and by the end-to-end tests. Not part of the protocol itself — kept
//! separate from `server/` so nothing here is mistaken for a required
//! capability.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::error::ToolError;
use crate::protocol::{ContentBlock, PromptArgument, PromptDescriptor, PromptGetResult, PromptMessage, PromptRole, ResourceContent, ResourceDescriptor};
use crate::server::McpServerBuilder;

/// Register the demo tools (`echo`, `add`), the demo resource
/// (`mem://greeting`), and the demo prompt (`greeting`) onto a builder.
///
/// # Panics
///
/// Panics if any of these names somehow collide with an
/// already-registered entry — they never do for a fresh builder, which
/// is the only way this function is called.
#[must_use]
pub fn register_all(builder: McpServerBuilder) -> McpServerBuilder {
    builder
        .tool("echo", "Echoes its input argument back unchanged.", json!({"type": "object"}), echo_tool)
        .expect("echo is a fresh tool name")
        .tool("add", "Adds two numbers.", add_schema(), add_tool)
        .expect("add is a fresh tool name")
        .resource(greeting_resource_descriptor(), greeting_resource)
        .expect("mem://greeting is a fresh resource uri")
        .prompt(greeting_prompt_descriptor(), greeting_prompt)
        .expect("greeting is a fresh prompt name")
}

async fn echo_tool(arguments: Value) -> Result<Value, ToolError> {
    Ok(arguments)
}

fn add_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "a": {"type": "number"},
            "b": {"type": "number"},
        },
        "required": ["a", "b"],
    })
}

async fn add_tool(arguments: Value) -> Result<Value, ToolError> {
    let a = arguments.get("a").and_then(Value::as_f64).ok_or_else(|| ToolError::validation("a", "required number"))?;
    let b = arguments.get("b").and_then(Value::as_f64).ok_or_else(|| ToolError::validation("b", "required number"))?;
    let sum = a + b;
    if sum.fract() == 0.0 {
        Ok(json!(sum as i64))
    } else {
        Ok(json!(sum))
    }
}

fn greeting_resource_descriptor() -> ResourceDescriptor {
    ResourceDescriptor {
        uri: "mem://greeting".to_string(),
        name: "greeting".to_string(),
        description: Some("A static greeting string.".to_string()),
        mime_type: Some("text/plain".to_string()),
    }
}

async fn greeting_resource() -> Result<ResourceContent, ToolError> {
    Ok(ResourceContent {
        uri: "mem://greeting".to_string(),
        mime_type: Some("text/plain".to_string()),
        text: Some("Hello from mcp-core!".to_string()),
        blob: None,
    })
}

fn greeting_prompt_descriptor() -> PromptDescriptor {
    PromptDescriptor {
        name: "greeting".to_string(),
        description: Some("Renders a greeting for the given name.".to_string()),
        arguments: vec![PromptArgument { name: "name".to_string(), description: Some("Who to greet.".to_string()), required: true }],
    }
}

async fn greeting_prompt(arguments: HashMap<String, String>) -> Result<PromptGetResult, ToolError> {
    let name = arguments.get("name").cloned().unwrap_or_else(|| "there".to_string());
    Ok(PromptGetResult {
        description: Some("A friendly greeting.".to_string()),
        messages: vec![PromptMessage { role: PromptRole::User, content: ContentBlock::text(format!("Hello, {name}!")) }],
    })
}
