//! The server half of the protocol: registries, the `initialize`
//! handshake, method dispatch, and the two transport entry points
//! (stdio, SSE+HTTP).
//!
//! A transport-agnostic dispatcher over three independent registries
//! (tools, resources, prompts), with a `run_stdio`/`run_sse` split
//! mirroring the two supported transports.

pub mod prompts;
pub mod registry;
pub mod resources;

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;

use crate::auth::{self, AlwaysSucceedValidator, ApiKeyValidator, AuthState, StaticKeyValidator};
use crate::config::{ServerConfig, TransportKind};
use crate::error::{ConfigResult, ProtocolError, ToolError};
use crate::frame::{Frame, Id};
use crate::protocol::{
    InitializeParams, InitializeResult, PromptDescriptor, PromptGetParams, PromptGetResult, PromptsCapability,
    PromptsListResult, ResourceContent, ResourceDescriptor, ResourceReadParams, ResourceReadResult,
    ResourcesCapability, ResourcesListResult, ServerCapabilities, ServerInfo, ToolCallParams, ToolCallResult,
    ToolsCapability, ToolsListResult, PROTOCOL_VERSION,
};
use crate::server::prompts::PromptRegistry;
use crate::server::registry::ToolRegistry;
use crate::server::resources::ResourceRegistry;
use crate::session::{SessionManager, SessionRecord, SessionState};
use crate::shutdown::ShutdownCoordinator;
use crate::transport::sse::sse_router;
use crate::transport::StdioServerTransport;

/// Assembles a [`McpServer`] by registering tools/resources/prompts
/// before anything starts serving. Mirrors the registries' own
/// "registration is the only mutable phase" contract.
pub struct McpServerBuilder {
    config: ServerConfig,
    tools: ToolRegistry,
    resources: ResourceRegistry,
    prompts: PromptRegistry,
}

impl McpServerBuilder {
    /// Start building a server for the given configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self { config, tools: ToolRegistry::new(), resources: ResourceRegistry::new(), prompts: PromptRegistry::new() }
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ConfigError::DuplicateTool`] if the name
    /// is already registered.
    pub fn tool<F, Fut>(mut self, name: impl Into<String>, description: impl Into<String>, input_schema: Value, handler: F) -> ConfigResult<Self>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.tools.register(name, description, input_schema, handler)?;
        Ok(self)
    }

    /// Register a resource.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ConfigError::DuplicateResource`] if the
    /// URI is already registered.
    pub fn resource<F, Fut>(mut self, descriptor: ResourceDescriptor, handler: F) -> ConfigResult<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ResourceContent, ToolError>> + Send + 'static,
    {
        self.resources.register(descriptor, handler)?;
        Ok(self)
    }

    /// Register a prompt template.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ConfigError::DuplicatePrompt`] if the
    /// name is already registered.
    pub fn prompt<F, Fut>(mut self, descriptor: PromptDescriptor, handler: F) -> ConfigResult<Self>
    where
        F: Fn(std::collections::HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<PromptGetResult, ToolError>> + Send + 'static,
    {
        self.prompts.register(descriptor, handler)?;
        Ok(self)
    }

    /// Finish assembly and hand back a server ready to run.
    #[must_use]
    pub fn build(self) -> Arc<McpServer> {
        let sessions = SessionManager::new(self.config.idle_timeout, self.config.sweep_interval, self.config.sse_queue_capacity);
        Arc::new(McpServer { config: self.config, tools: self.tools, resources: self.resources, prompts: self.prompts, sessions })
    }
}

/// The server side of the protocol: owns the three registries and the
/// session manager, and dispatches every inbound frame regardless of
/// which transport carried it.
pub struct McpServer {
    config: ServerConfig,
    tools: ToolRegistry,
    resources: ResourceRegistry,
    prompts: PromptRegistry,
    sessions: SessionManager,
}

impl McpServer {
    /// Start building a server for the given configuration.
    #[must_use]
    pub fn builder(config: ServerConfig) -> McpServerBuilder {
        McpServerBuilder::new(config)
    }

    /// The configuration this server was built with.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The session manager, shared across every transport this server
    /// runs.
    #[must_use]
    pub const fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: (!self.tools.is_empty()).then(ToolsCapability::default),
            resources: (!self.resources.is_empty()).then(ResourcesCapability::default),
            prompts: (!self.prompts.is_empty()).then(PromptsCapability::default),
        }
    }

    /// Dispatch one inbound frame for `session`, returning the response
    /// frame to send back (if any). Requests always produce a response
    /// (success or error); notifications never do; a `Response`/`Error`
    /// arriving at a server is logged and dropped — nothing on this side
    /// is waiting on it.
    pub async fn handle_frame(&self, session: &SessionRecord, frame: Frame) -> Option<Frame> {
        match frame {
            Frame::Request { id, method, params } => Some(self.handle_request(session, id, method, params).await),
            Frame::Notification { method, params } => {
                self.handle_notification(session, method, params).await;
                None
            }
            Frame::Response { id, .. } | Frame::Error { id, .. } => {
                tracing::warn!(session_id = %session.id, ?id, "server received a response/error frame, ignoring");
                None
            }
        }
    }

    async fn handle_request(&self, session: &SessionRecord, id: Id, method: String, params: Option<Value>) -> Frame {
        match method.as_str() {
            "initialize" => self.handle_initialize(session, id, params).await,
            "tools/list" => self.guarded(session, &id, self.tools.is_empty(), &method, || self.handle_tools_list(id.clone())).await,
            "tools/call" => {
                self.guarded(session, &id, self.tools.is_empty(), &method, || self.handle_tools_call(id.clone(), params.clone())).await
            }
            "resources/list" => {
                self.guarded(session, &id, self.resources.is_empty(), &method, || self.handle_resources_list(id.clone())).await
            }
            "resources/read" => {
                self.guarded(session, &id, self.resources.is_empty(), &method, || self.handle_resources_read(id.clone(), params.clone())).await
            }
            "prompts/list" => {
                self.guarded(session, &id, self.prompts.is_empty(), &method, || self.handle_prompts_list(id.clone())).await
            }
            "prompts/get" => {
                self.guarded(session, &id, self.prompts.is_empty(), &method, || self.handle_prompts_get(id.clone(), params.clone())).await
            }
            other => error_frame(id, ProtocolError::MethodNotFound(other.to_string())),
        }
    }

    /// Shared state-guard: a method whose capability isn't registered is
    /// `MethodNotFound` regardless of session state; otherwise the
    /// session must be `Initialized` or the call fails with
    /// `InvalidRequest` naming the current state.
    async fn guarded<'a, F, Fut>(&'a self, session: &SessionRecord, id: &Id, capability_absent: bool, method: &str, handler: F) -> Frame
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Frame> + 'a,
    {
        if capability_absent {
            return error_frame(id.clone(), ProtocolError::MethodNotFound(method.to_string()));
        }
        let state = session.state().await;
        if state != SessionState::Initialized {
            return error_frame(id.clone(), ProtocolError::InvalidRequest(format!("'{method}' not permitted in state '{}'", state.as_str())));
        }
        handler().await
    }

    async fn handle_initialize(&self, session: &SessionRecord, id: Id, params: Option<Value>) -> Frame {
        let state = session.state().await;
        if state != SessionState::Opening {
            return error_frame(id, ProtocolError::InvalidRequest(format!("'initialize' not permitted in state '{}'", state.as_str())));
        }

        let params: InitializeParams = match params {
            Some(value) => match serde_json::from_value(value) {
                Ok(params) => params,
                Err(err) => return error_frame(id, ProtocolError::InvalidParams(err.to_string())),
            },
            None => return error_frame(id, ProtocolError::InvalidParams("missing params".to_string())),
        };

        tracing::info!(
            session_id = %session.id,
            client_name = %params.client_info.name,
            client_protocol_version = %params.protocol_version,
            "session initializing"
        );

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: self.capabilities(),
            server_info: ServerInfo { name: self.config.server_name.clone(), version: self.config.server_version.clone() },
            instructions: self.config.instructions.clone(),
        };

        session.transition(SessionState::AwaitingInitialized).await;
        Frame::response(id, serde_json::to_value(result).unwrap_or(Value::Null))
    }

    async fn handle_notification(&self, session: &SessionRecord, method: String, _params: Option<Value>) {
        match method.as_str() {
            "notifications/initialized" => {
                let state = session.state().await;
                if state == SessionState::AwaitingInitialized {
                    session.transition(SessionState::Initialized).await;
                } else {
                    tracing::warn!(session_id = %session.id, state = state.as_str(), "unexpected notifications/initialized");
                }
            }
            other => tracing::debug!(session_id = %session.id, method = %other, "unhandled notification"),
        }
    }

    async fn handle_tools_list(&self, id: Id) -> Frame {
        let result = ToolsListResult { tools: self.tools.list() };
        Frame::response(id, serde_json::to_value(result).unwrap_or(Value::Null))
    }

    async fn handle_tools_call(&self, id: Id, params: Option<Value>) -> Frame {
        let params: ToolCallParams = match params {
            Some(value) => match serde_json::from_value(value) {
                Ok(params) => params,
                Err(err) => return error_frame(id, ProtocolError::InvalidParams(err.to_string())),
            },
            None => return error_frame(id, ProtocolError::InvalidParams("missing params".to_string())),
        };

        match self.tools.call(&params.name, params.arguments).await {
            Ok(result) => response_frame(id, result),
            Err(err) => error_frame(id, err),
        }
    }

    async fn handle_resources_list(&self, id: Id) -> Frame {
        let result = ResourcesListResult { resources: self.resources.list() };
        Frame::response(id, serde_json::to_value(result).unwrap_or(Value::Null))
    }

    async fn handle_resources_read(&self, id: Id, params: Option<Value>) -> Frame {
        let params: ResourceReadParams = match params {
            Some(value) => match serde_json::from_value(value) {
                Ok(params) => params,
                Err(err) => return error_frame(id, ProtocolError::InvalidParams(err.to_string())),
            },
            None => return error_frame(id, ProtocolError::InvalidParams("missing params".to_string())),
        };

        match self.resources.read(&params.uri).await {
            Ok(content) => response_frame(id, ResourceReadResult { contents: vec![content] }),
            Err(err) => error_frame(id, err),
        }
    }

    async fn handle_prompts_list(&self, id: Id) -> Frame {
        let result = PromptsListResult { prompts: self.prompts.list() };
        Frame::response(id, serde_json::to_value(result).unwrap_or(Value::Null))
    }

    async fn handle_prompts_get(&self, id: Id, params: Option<Value>) -> Frame {
        let params: PromptGetParams = match params {
            Some(value) => match serde_json::from_value(value) {
                Ok(params) => params,
                Err(err) => return error_frame(id, ProtocolError::InvalidParams(err.to_string())),
            },
            None => return error_frame(id, ProtocolError::InvalidParams("missing params".to_string())),
        };

        match self.prompts.get(&params.name, params.arguments).await {
            Ok(result) => response_frame(id, result),
            Err(err) => error_frame(id, err),
        }
    }

    /// Run this server over stdio, serving the current process's
    /// stdin/stdout as a single long-lived session until stdin closes or
    /// a stop signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error on a stdin I/O failure.
    pub async fn run_stdio(self: Arc<Self>) -> anyhow::Result<()> {
        let transport = Arc::new(StdioServerTransport::new());
        let session = self.sessions.register().await;
        let coordinator = ShutdownCoordinator::new(self.sessions.clone(), self.config.shutdown_drain_budget);

        tracing::info!("mcp server listening on stdio");

        let server = self.clone();
        let reader_session = session.clone();
        let reader_transport = transport.clone();
        let reader = async move {
            reader_transport
                .run(move |frame| {
                    let server = server.clone();
                    let session = reader_session.clone();
                    let transport = reader_transport.clone();
                    async move {
                        if let Some(response) = server.handle_frame(&session, frame).await {
                            if let Err(err) = transport.send(&response).await {
                                tracing::warn!(error = %err, "failed to write stdio response");
                            }
                        }
                    }
                })
                .await
        };

        tokio::select! {
            result = reader => result?,
            () = coordinator.wait_for_signal() => {}
        }

        self.sessions.remove(&session.id).await;
        Ok(())
    }

    /// Run this server over SSE+HTTP, binding to the configured host and
    /// port until a stop signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind, or on a fatal
    /// server failure.
    pub async fn run_sse(self: Arc<Self>) -> anyhow::Result<()> {
        let mut router = sse_router(self.clone());

        if self.config.auth_enabled() {
            let validator: Arc<dyn ApiKeyValidator> = Arc::new(StaticKeyValidator::new(self.config.api_keys.clone()));
            let auth_state = Arc::new(AuthState::new(validator, self.config.secured_paths.clone(), self.config.allow_query_api_key));
            router = router.layer(axum::middleware::from_fn_with_state(auth_state, auth::require_api_key));
        } else {
            drop(AlwaysSucceedValidator::new());
        }

        let sweeper = self.sessions.spawn_sweeper();
        let coordinator = ShutdownCoordinator::new(self.sessions.clone(), self.config.shutdown_drain_budget);

        let addr: SocketAddr = format!("{}:{}", self.config.bind_host, self.config.bind_port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, sse_path = %self.config.sse_path, messages_path = %self.config.messages_path, "mcp server listening");

        axum::serve(listener, router).with_graceful_shutdown(async move { coordinator.wait_for_signal().await }).await?;

        sweeper.abort();
        Ok(())
    }

    /// Run whichever transport `config.transport` selects.
    ///
    /// # Errors
    ///
    /// Propagates whatever [`McpServer::run_stdio`] or
    /// [`McpServer::run_sse`] returns.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        match self.config.transport {
            TransportKind::Stdio => self.run_stdio().await,
            TransportKind::Sse => self.run_sse().await,
        }
    }
}

fn response_frame(id: Id, result: impl serde::Serialize) -> Frame {
    Frame::response(id, serde_json::to_value(result).unwrap_or(Value::Null))
}

fn error_frame(id: Id, err: ProtocolError) -> Frame {
    Frame::Error { id, code: err.rpc_code(), message: err.to_string(), data: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ClientCapabilities, ClientInfo};
    use serde_json::json;

    fn add_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
            "required": ["a", "b"],
        })
    }

    fn test_server() -> Arc<McpServer> {
        McpServer::builder(ServerConfig::new("test-server", "0.0.1"))
            .tool("add", "adds two numbers", add_schema(), |args| async move {
                let a = args.get("a").and_then(Value::as_f64).unwrap_or_default();
                let b = args.get("b").and_then(Value::as_f64).unwrap_or_default();
                let sum = a + b;
                // Keep sums that land on an integer rendered without a
                // trailing `.0`, matching demos::add_tool exactly.
                Ok(if sum.fract() == 0.0 { json!(sum as i64) } else { json!(sum) })
            })
            .unwrap()
            .build()
    }

    fn init_frame(id: i64) -> Frame {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo { name: "test-client".into(), version: "0.0.1".into() },
        };
        Frame::request(json!(id), "initialize", Some(serde_json::to_value(params).unwrap()))
    }

    #[tokio::test]
    async fn tools_call_before_initialize_is_invalid_request() {
        let server = test_server();
        let session = server.sessions.register().await;
        let frame = Frame::request(json!(1), "tools/call", Some(json!({"name": "add", "arguments": {"a": 1, "b": 2}})));
        let response = server.handle_frame(&session, frame).await.unwrap();
        assert!(matches!(response, Frame::Error { code, .. } if code == crate::error::INVALID_REQUEST));
    }

    #[tokio::test]
    async fn full_handshake_then_tool_call_succeeds() {
        let server = test_server();
        let session = server.sessions.register().await;

        let response = server.handle_frame(&session, init_frame(1)).await.unwrap();
        assert!(matches!(response, Frame::Response { .. }));
        assert_eq!(session.state().await, SessionState::AwaitingInitialized);

        let ack = server.handle_frame(&session, Frame::notification("notifications/initialized", None)).await;
        assert!(ack.is_none());
        assert_eq!(session.state().await, SessionState::Initialized);

        let call = Frame::request(json!(2), "tools/call", Some(json!({"name": "add", "arguments": {"a": 2, "b": 3}})));
        let response = server.handle_frame(&session, call).await.unwrap();
        let Frame::Response { result, .. } = response else { panic!("expected a response frame") };
        let result: ToolCallResult = serde_json::from_value(result).unwrap();
        assert_eq!(result.content[0].as_text(), Some("5"));
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn unknown_tool_call_is_invalid_params_not_method_not_found() {
        let server = test_server();
        let session = server.sessions.register().await;
        server.handle_frame(&session, init_frame(1)).await;
        server.handle_frame(&session, Frame::notification("notifications/initialized", None)).await;

        let call = Frame::request(json!(3), "tools/call", Some(json!({"name": "nope"})));
        let response = server.handle_frame(&session, call).await.unwrap();
        assert!(matches!(response, Frame::Error { code, .. } if code == crate::error::INVALID_PARAMS));
    }

    #[tokio::test]
    async fn tool_call_missing_required_argument_is_invalid_params_not_is_error_result() {
        let server = test_server();
        let session = server.sessions.register().await;
        server.handle_frame(&session, init_frame(1)).await;
        server.handle_frame(&session, Frame::notification("notifications/initialized", None)).await;

        let call = Frame::request(json!(3), "tools/call", Some(json!({"name": "add", "arguments": {"a": 2}})));
        let response = server.handle_frame(&session, call).await.unwrap();
        assert!(matches!(response, Frame::Error { code, .. } if code == crate::error::INVALID_PARAMS));
    }

    #[tokio::test]
    async fn prompts_list_is_method_not_found_when_no_prompts_registered() {
        let server = test_server();
        let session = server.sessions.register().await;
        server.handle_frame(&session, init_frame(1)).await;
        server.handle_frame(&session, Frame::notification("notifications/initialized", None)).await;

        let call = Frame::request(json!(4), "prompts/list", None);
        let response = server.handle_frame(&session, call).await.unwrap();
        assert!(matches!(response, Frame::Error { code, .. } if code == crate::error::METHOD_NOT_FOUND));
    }

    #[tokio::test]
    async fn second_initialize_is_rejected() {
        let server = test_server();
        let session = server.sessions.register().await;
        server.handle_frame(&session, init_frame(1)).await;

        let response = server.handle_frame(&session, init_frame(2)).await.unwrap();
        assert!(matches!(response, Frame::Error { code, .. } if code == crate::error::INVALID_REQUEST));
    }
}
