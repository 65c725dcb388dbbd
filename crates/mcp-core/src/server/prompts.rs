//! Prompt registry: `prompts/list` / `prompts/get` (supplemental, same
//! rationale as [`crate::server::resources::ResourceRegistry`]).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{ConfigError, ConfigResult, ProtocolError, ProtocolResult, ToolError};
use crate::protocol::{PromptDescriptor, PromptGetResult};

type PromptHandler = Arc<
    dyn Fn(HashMap<String, String>) -> Pin<Box<dyn Future<Output = Result<PromptGetResult, ToolError>> + Send>>
        + Send
        + Sync,
>;

struct RegisteredPrompt {
    descriptor: PromptDescriptor,
    handler: PromptHandler,
}

/// Holds every prompt template registered at startup.
#[derive(Default)]
pub struct PromptRegistry {
    prompts: Vec<RegisteredPrompt>,
    index: HashMap<String, usize>,
}

impl PromptRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prompt template under `descriptor.name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicatePrompt`] if the name is already
    /// registered.
    pub fn register<F, Fut>(&mut self, descriptor: PromptDescriptor, handler: F) -> ConfigResult<()>
    where
        F: Fn(HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PromptGetResult, ToolError>> + Send + 'static,
    {
        if self.index.contains_key(&descriptor.name) {
            return Err(ConfigError::DuplicatePrompt(descriptor.name.clone()));
        }
        let name = descriptor.name.clone();
        let handler: PromptHandler = Arc::new(move |args| Box::pin(handler(args)));
        self.index.insert(name, self.prompts.len());
        self.prompts.push(RegisteredPrompt { descriptor, handler });
        Ok(())
    }

    /// Whether any prompt is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// All descriptors, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<PromptDescriptor> {
        self.prompts.iter().map(|p| p.descriptor.clone()).collect()
    }

    /// Render a prompt by name, validating required arguments first per
    /// its declared [`crate::protocol::PromptArgument`] list.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidParams`] for an unknown prompt or
    /// a missing required argument, or [`ProtocolError::Internal`] if the
    /// handler itself fails.
    pub async fn get(&self, name: &str, arguments: HashMap<String, String>) -> ProtocolResult<PromptGetResult> {
        let Some(&index) = self.index.get(name) else {
            return Err(ProtocolError::InvalidParams(format!("Prompt not found: {name}")));
        };
        let prompt = &self.prompts[index];
        for argument in &prompt.descriptor.arguments {
            if argument.required && !arguments.contains_key(&argument.name) {
                return Err(ProtocolError::InvalidParams(format!("missing required argument: {}", argument.name)));
            }
        }
        let handler = prompt.handler.clone();
        handler(arguments).await.map_err(|err| ProtocolError::Internal(err.to_string()))
    }
}
