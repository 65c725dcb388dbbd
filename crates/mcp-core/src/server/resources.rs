//! Resource registry: `resources/list` / `resources/read` (supplemental
//! — the method table requires these to resolve to something other than
//! `MethodNotFound` once a resource capability is advertised, mirroring
//! [`crate::server::registry::ToolRegistry`]'s shape).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{ConfigError, ConfigResult, ProtocolError, ProtocolResult, ToolError};
use crate::protocol::{ResourceContent, ResourceDescriptor};

type ResourceHandler = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<ResourceContent, ToolError>> + Send>> + Send + Sync>;

struct RegisteredResource {
    descriptor: ResourceDescriptor,
    handler: ResourceHandler,
}

/// Holds every resource registered at startup.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: Vec<RegisteredResource>,
    index: HashMap<String, usize>,
}

impl ResourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource under its URI.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateResource`] if the URI is already
    /// registered.
    pub fn register<F, Fut>(&mut self, descriptor: ResourceDescriptor, handler: F) -> ConfigResult<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResourceContent, ToolError>> + Send + 'static,
    {
        if self.index.contains_key(&descriptor.uri) {
            return Err(ConfigError::DuplicateResource(descriptor.uri.clone()));
        }
        let uri = descriptor.uri.clone();
        let handler: ResourceHandler = Arc::new(move || Box::pin(handler()));
        self.index.insert(uri, self.resources.len());
        self.resources.push(RegisteredResource { descriptor, handler });
        Ok(())
    }

    /// Whether any resource is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// All descriptors, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<ResourceDescriptor> {
        self.resources.iter().map(|r| r.descriptor.clone()).collect()
    }

    /// Read a resource by URI.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::application`] (resource-not-found, in the
    /// reserved application error range) for an unknown URI, or
    /// [`ProtocolError::Internal`] if the handler itself fails.
    pub async fn read(&self, uri: &str) -> ProtocolResult<ResourceContent> {
        let Some(&index) = self.index.get(uri) else {
            return Err(ProtocolError::application(-32002, format!("Resource not found: {uri}")));
        };
        let handler = self.resources[index].handler.clone();
        handler().await.map_err(|err| ProtocolError::Internal(err.to_string()))
    }
}
