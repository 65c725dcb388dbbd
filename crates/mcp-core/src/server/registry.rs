//! Tool registry: registration, descriptor listing, and invocation.
//!
//! Tools are plain closures over `serde_json::Value`, registered once
//! at startup and never mutated after.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;

use crate::error::{ConfigError, ConfigResult, ProtocolError, ProtocolResult, ToolError};
use crate::protocol::{ToolCallResult, ToolDescriptor};

/// A tool handler: takes the raw `arguments` value and returns a result
/// value or a [`ToolError`]. Boxed to allow both sync-computed and
/// `async move` closures to be registered uniformly.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>> + Send + Sync>;

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: ToolHandler,
}

/// Holds every tool registered at startup. Construction is the only
/// mutable phase; afterwards `Arc<ToolRegistry>` is shared freely across
/// sessions with no locking.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails fast if `name` is already registered: a
    /// duplicate name is a configuration error, not silent shadowing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateTool`] if `name` is already taken.
    pub fn register<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> ConfigResult<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(ConfigError::DuplicateTool(name));
        }
        let descriptor = ToolDescriptor { name: name.clone(), description: Some(description.into()), input_schema };
        let handler: ToolHandler = Arc::new(move |args| Box::pin(handler(args)));
        self.index.insert(name, self.tools.len());
        self.tools.push(RegisteredTool { descriptor, handler });
        Ok(())
    }

    /// Whether any tool is registered; determines whether the server
    /// advertises the `tools` capability at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// All descriptors, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor.clone()).collect()
    }

    /// Invoke `tools/call`:
    /// - unknown tool, missing required argument, or an argument whose
    ///   type doesn't match its declared schema -> `InvalidParams` (a
    ///   protocol error, not a tool error — the JSON-RPC method itself is
    ///   valid);
    /// - handler panic or error -> caught and returned as
    ///   `ToolCallResult { isError: true }`, never propagated as a
    ///   JSON-RPC error.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidParams`] for the unknown-tool case
    /// and for argument binding failures; every other failure mode is
    /// reflected in the `Ok` result.
    pub async fn call(&self, name: &str, arguments: Value) -> ProtocolResult<ToolCallResult> {
        let Some(&index) = self.index.get(name) else {
            return Err(ProtocolError::InvalidParams(format!("Tool not found: {name}")));
        };
        let tool = &self.tools[index];
        let bound = bind_arguments(&tool.descriptor.input_schema, arguments).map_err(ProtocolError::InvalidParams)?;
        let handler = tool.handler.clone();

        let outcome = AssertUnwindSafe(handler(bound)).catch_unwind().await;

        Ok(match outcome {
            // A handler that already built a full ToolCallResult (e.g. to
            // emit an image block) passes it through as-is.
            Ok(Ok(value)) => serde_json::from_value(value.clone())
                .unwrap_or_else(|_| ToolCallResult::text(render_tool_value(&value))),
            Ok(Err(tool_error)) => ToolCallResult::error_text(tool_error.to_user_message()),
            Err(panic) => ToolCallResult::error_text(describe_panic(&panic)),
        })
    }
}

/// Bind `arguments` against a tool's `inputSchema`: each declared
/// property is looked up case-insensitively; a missing required property
/// fails, a missing optional property with a `default` is filled in, and
/// a present property whose JSON type doesn't match its schema `type`
/// fails. Schemas with no `properties` (or tools with no meaningful
/// input) pass `arguments` through unchanged.
fn bind_arguments(schema: &Value, arguments: Value) -> Result<Value, String> {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(arguments);
    };
    let required: Vec<&str> =
        schema.get("required").and_then(Value::as_array).map(|r| r.iter().filter_map(Value::as_str).collect()).unwrap_or_default();

    let mut args_map = match arguments {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => return Err(format!("arguments must be an object, got {}", type_name(&other))),
    };

    for (name, prop_schema) in properties {
        let existing_key = args_map.keys().find(|k| k.eq_ignore_ascii_case(name)).cloned();
        match existing_key {
            Some(key) => {
                // Pulled by lowercase name: normalize the stored key to
                // the schema's declared casing so handlers can always
                // look it up by that name regardless of how the caller
                // cased it.
                let value = args_map.remove(&key).unwrap_or(Value::Null);
                if let Some(expected_type) = prop_schema.get("type").and_then(Value::as_str) {
                    if !value_matches_type(&value, expected_type) {
                        return Err(format!(
                            "argument '{name}' must be of type {expected_type}, got {}",
                            type_name(&value)
                        ));
                    }
                }
                args_map.insert(name.clone(), value);
            }
            None if required.contains(&name.as_str()) => {
                return Err(format!("missing required argument: {name}"));
            }
            None => {
                if let Some(default) = prop_schema.get("default") {
                    args_map.insert(name.clone(), default.clone());
                }
            }
        }
    }

    Ok(Value::Object(args_map))
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        // Unrecognized/custom type keywords aren't gated on.
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe_panic(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("tool handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("tool handler panicked: {message}")
    } else {
        "tool handler panicked".to_string()
    }
}

/// Render a handler's raw return value as a single text content block:
/// strings pass through verbatim, everything else becomes pretty-printed
/// JSON.
fn render_tool_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
            "required": ["a", "b"],
        })
    }

    #[tokio::test]
    async fn register_and_list_preserves_order() {
        let mut registry = ToolRegistry::new();
        registry.register("b_tool", "second", json!({}), |_| async { Ok(json!("b")) }).unwrap();
        registry.register("a_tool", "first", json!({}), |_| async { Ok(json!("a")) }).unwrap();
        let names: Vec<_> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["b_tool", "a_tool"]);
    }

    #[tokio::test]
    async fn duplicate_registration_fails_fast() {
        let mut registry = ToolRegistry::new();
        registry.register("add", "add", add_schema(), |_| async { Ok(json!(0)) }).unwrap();
        let result = registry.register("add", "add again", add_schema(), |_| async { Ok(json!(0)) });
        assert!(matches!(result, Err(ConfigError::DuplicateTool(name)) if name == "add"));
    }

    #[tokio::test]
    async fn call_unknown_tool_is_invalid_params() {
        let registry = ToolRegistry::new();
        let result = registry.call("nope", json!({})).await;
        assert!(matches!(result, Err(ProtocolError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn call_add_tool_returns_text_result() {
        let mut registry = ToolRegistry::new();
        registry
            .register("add", "adds two numbers", add_schema(), |args| async move {
                let a = args.get("a").and_then(Value::as_f64).ok_or_else(|| ToolError::validation("a", "required"))?;
                let b = args.get("b").and_then(Value::as_f64).ok_or_else(|| ToolError::validation("b", "required"))?;
                let sum = a + b;
                Ok(if sum.fract() == 0.0 { json!(sum as i64) } else { json!(sum) })
            })
            .unwrap();

        let result = registry.call("add", json!({"a": 2, "b": 3})).await.unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content[0].as_text(), Some("5"));
    }

    #[tokio::test]
    async fn call_missing_required_argument_is_invalid_params() {
        let mut registry = ToolRegistry::new();
        registry.register("add", "adds two numbers", add_schema(), |_| async { Ok(json!(0)) }).unwrap();

        let result = registry.call("add", json!({"a": 2})).await;
        assert!(matches!(result, Err(ProtocolError::InvalidParams(msg)) if msg.contains('b')));
    }

    #[tokio::test]
    async fn call_argument_type_mismatch_is_invalid_params() {
        let mut registry = ToolRegistry::new();
        registry.register("add", "adds two numbers", add_schema(), |_| async { Ok(json!(0)) }).unwrap();

        let result = registry.call("add", json!({"a": "not a number", "b": 3})).await;
        assert!(matches!(result, Err(ProtocolError::InvalidParams(msg)) if msg.contains('a')));
    }

    #[tokio::test]
    async fn call_fills_in_declared_default_for_missing_optional_argument() {
        let schema = json!({
            "type": "object",
            "properties": {"greeting": {"type": "string", "default": "hello"}},
            "required": [],
        });
        let mut registry = ToolRegistry::new();
        registry
            .register("greet", "greets", schema, |args| async move {
                Ok(json!(args.get("greeting").and_then(Value::as_str).unwrap_or_default()))
            })
            .unwrap();

        let result = registry.call("greet", json!({})).await.unwrap();
        assert_eq!(result.content[0].as_text(), Some("hello"));
    }

    #[tokio::test]
    async fn call_binds_arguments_case_insensitively() {
        let mut registry = ToolRegistry::new();
        registry
            .register("add", "adds two numbers", add_schema(), |args| async move {
                let a = args.get("a").and_then(Value::as_f64).unwrap_or_default();
                let b = args.get("b").and_then(Value::as_f64).unwrap_or_default();
                Ok(json!((a + b) as i64))
            })
            .unwrap();

        let result = registry.call("add", json!({"A": 2, "B": 3})).await.unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content[0].as_text(), Some("5"));
    }

    #[tokio::test]
    async fn handler_error_becomes_is_error_result() {
        let mut registry = ToolRegistry::new();
        registry
            .register("fail", "always fails", json!({}), |_| async {
                Err(ToolError::handler("boom"))
            })
            .unwrap();
        let result = registry.call("fail", json!({})).await.unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn handler_panic_becomes_is_error_result_not_rpc_error() {
        let mut registry = ToolRegistry::new();
        registry
            .register("panics", "panics", json!({}), |_| async {
                panic!("unexpected");
                #[allow(unreachable_code)]
                Ok(json!(null))
            })
            .unwrap();
        let result = registry.call("panics", json!({})).await.unwrap();
        assert!(result.is_error);
    }
}
