//! Client RPC dispatcher: allocates request ids, tracks pending
//! completions, races each call against a timeout, and fails every
//! pending call when the underlying transport closes. Runs over either
//! of this crate's two transports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::config::{defaults, ClientConfig};
use crate::error::{ClientError, ClientResult, CodecError, TransportError};
use crate::frame::{Frame, Id};
use crate::protocol::{
    ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, PromptDescriptor, PromptGetParams,
    PromptGetResult, PromptsListResult, ResourceContent, ResourceDescriptor, ResourceReadParams, ResourceReadResult,
    ResourcesListResult, ToolCallParams, ToolCallResult, ToolDescriptor, ToolsListResult, PROTOCOL_VERSION,
};
use crate::transport::sse::SseClientTransport;
use crate::transport::StdioClientTransport;

enum ClientTransport {
    Stdio(Arc<StdioClientTransport>),
    Sse(Arc<SseClientTransport>),
}

impl ClientTransport {
    async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        match self {
            Self::Stdio(transport) => transport.send(frame).await,
            Self::Sse(transport) => transport.send(frame).await,
        }
    }
}

type Completion = oneshot::Sender<Result<Value, ClientError>>;

/// A connected MCP client: owns the transport, the pending-request map,
/// and the background task draining incoming frames.
pub struct McpClient {
    transport: ClientTransport,
    pending: Mutex<HashMap<Id, Completion>>,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl McpClient {
    /// Spawn `command` and connect to it over the stdio transport.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the command cannot be
    /// spawned.
    pub async fn connect_stdio(command: &str, config: &ClientConfig) -> ClientResult<Arc<Self>> {
        let (transport, incoming) = StdioClientTransport::spawn(command).await?;
        Ok(Self::from_parts(ClientTransport::Stdio(transport), incoming, config.request_timeout))
    }

    /// Connect to a running server over the SSE+HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the GET stream can't be
    /// opened or the `endpoint` event never arrives.
    pub async fn connect_sse(base_url: &str, config: &ClientConfig) -> ClientResult<Arc<Self>> {
        let (transport, incoming) =
            SseClientTransport::connect(base_url, defaults::SSE_PATH, config.endpoint_wait_timeout).await?;
        Ok(Self::from_parts(ClientTransport::Sse(transport), incoming, config.request_timeout))
    }

    fn from_parts(transport: ClientTransport, incoming: mpsc::UnboundedReceiver<Frame>, request_timeout: Duration) -> Arc<Self> {
        let client = Arc::new(Self {
            transport,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            request_timeout,
        });
        client.clone().spawn_reader(incoming);
        client
    }

    fn spawn_reader(self: Arc<Self>, mut incoming: mpsc::UnboundedReceiver<Frame>) {
        tokio::spawn(async move {
            while let Some(frame) = incoming.recv().await {
                self.handle_incoming(frame).await;
            }
            tracing::info!("client transport closed, failing pending requests");
            self.fail_all_pending().await;
        });
    }

    async fn handle_incoming(&self, frame: Frame) {
        match frame {
            Frame::Response { id, result } => self.complete(&id, Ok(result)).await,
            Frame::Error { id, code, message, .. } => self.complete(&id, Err(ClientError::Server { code, message })).await,
            Frame::Request { method, .. } | Frame::Notification { method, .. } => {
                tracing::debug!(%method, "client received a server-initiated message, ignoring");
            }
        }
    }

    async fn complete(&self, id: &Id, result: Result<Value, ClientError>) {
        if let Some(tx) = self.pending.lock().await.remove(id) {
            let _ = tx.send(result);
        } else {
            tracing::warn!(?id, "response for unknown or already-completed request id, dropping");
        }
    }

    async fn fail_all_pending(&self) {
        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(ClientError::Transport(TransportError::Closed)));
        }
    }

    /// Send a request and await its response, racing `request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] on a write failure,
    /// [`ClientError::Timeout`] if no response arrives in time, or
    /// [`ClientError::Server`] if the server returns a JSON-RPC error.
    pub async fn send_request(&self, method: impl Into<String>, params: Option<Value>) -> ClientResult<Value> {
        let method = method.into();
        let id = Value::from(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        let frame = Frame::request(id.clone(), method.clone(), params);
        if let Err(err) = self.transport.send(&frame).await {
            self.pending.lock().await.remove(&id);
            return Err(ClientError::Transport(err));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::Transport(TransportError::Closed)),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ClientError::Timeout { method })
            }
        }
    }

    /// Send a one-way notification; no response is expected.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] on a write failure.
    pub async fn send_notification(&self, method: impl Into<String>, params: Option<Value>) -> ClientResult<()> {
        let frame = Frame::notification(method, params);
        self.transport.send(&frame).await.map_err(ClientError::Transport)
    }

    /// Run the full `initialize` handshake: send `initialize`, then
    /// `notifications/initialized` once the server responds.
    ///
    /// # Errors
    ///
    /// See [`McpClient::send_request`].
    pub async fn initialize(&self, client_name: impl Into<String>, client_version: impl Into<String>) -> ClientResult<InitializeResult> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo { name: client_name.into(), version: client_version.into() },
        };
        let value = self.send_request("initialize", Some(to_value(&params)?)).await?;
        let result = from_value(value)?;
        self.send_notification("notifications/initialized", None).await?;
        Ok(result)
    }

    /// List the server's registered tools.
    ///
    /// # Errors
    ///
    /// See [`McpClient::send_request`].
    pub async fn list_tools(&self) -> ClientResult<Vec<ToolDescriptor>> {
        let value = self.send_request("tools/list", None).await?;
        Ok(from_value::<ToolsListResult>(value)?.tools)
    }

    /// Invoke a tool by name.
    ///
    /// # Errors
    ///
    /// See [`McpClient::send_request`].
    pub async fn call_tool(&self, name: impl Into<String>, arguments: Value) -> ClientResult<ToolCallResult> {
        let params = ToolCallParams { name: name.into(), arguments };
        let value = self.send_request("tools/call", Some(to_value(&params)?)).await?;
        from_value(value)
    }

    /// List the server's registered resources.
    ///
    /// # Errors
    ///
    /// See [`McpClient::send_request`].
    pub async fn list_resources(&self) -> ClientResult<Vec<ResourceDescriptor>> {
        let value = self.send_request("resources/list", None).await?;
        Ok(from_value::<ResourcesListResult>(value)?.resources)
    }

    /// Read a resource by URI.
    ///
    /// # Errors
    ///
    /// See [`McpClient::send_request`].
    pub async fn read_resource(&self, uri: impl Into<String>) -> ClientResult<Vec<ResourceContent>> {
        let params = ResourceReadParams { uri: uri.into() };
        let value = self.send_request("resources/read", Some(to_value(&params)?)).await?;
        Ok(from_value::<ResourceReadResult>(value)?.contents)
    }

    /// List the server's registered prompts.
    ///
    /// # Errors
    ///
    /// See [`McpClient::send_request`].
    pub async fn list_prompts(&self) -> ClientResult<Vec<PromptDescriptor>> {
        let value = self.send_request("prompts/list", None).await?;
        Ok(from_value::<PromptsListResult>(value)?.prompts)
    }

    /// Render a prompt by name.
    ///
    /// # Errors
    ///
    /// See [`McpClient::send_request`].
    pub async fn get_prompt(&self, name: impl Into<String>, arguments: HashMap<String, String>) -> ClientResult<PromptGetResult> {
        let params = PromptGetParams { name: name.into(), arguments };
        let value = self.send_request("prompts/get", Some(to_value(&params)?)).await?;
        from_value(value)
    }

    /// Close the underlying transport and fail every pending request.
    pub async fn close(&self) {
        if let ClientTransport::Stdio(transport) = &self.transport {
            transport.close().await;
        }
        self.fail_all_pending().await;
    }
}

fn to_value(value: &impl Serialize) -> ClientResult<Value> {
    serde_json::to_value(value).map_err(|err| ClientError::Codec(CodecError::Parse(err)))
}

fn from_value<T: DeserializeOwned>(value: Value) -> ClientResult<T> {
    serde_json::from_value(value).map_err(|err| ClientError::Codec(CodecError::Parse(err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_ids_are_monotonic() {
        let config = ClientConfig::for_stdio("test-client", "0.0.1");
        let client = McpClient::connect_stdio("cat", &config).await.unwrap();

        // `cat` echoes the request frame back verbatim rather than a
        // response, so these never complete until the timeout fires —
        // this only exercises id allocation and pending bookkeeping.
        let first_id = client.next_id.load(Ordering::SeqCst);
        client.pending.lock().await.insert(Value::from(first_id), oneshot::channel().0);
        let second_id = client.next_id.fetch_add(1, Ordering::SeqCst);
        assert_eq!(second_id, first_id);
        assert!(client.next_id.load(Ordering::SeqCst) > first_id);

        client.close().await;
    }

    #[tokio::test]
    async fn request_times_out_when_no_matching_response_arrives() {
        let mut config = ClientConfig::for_stdio("test-client", "0.0.1");
        config.request_timeout = Duration::from_millis(200);
        let client = McpClient::connect_stdio("cat", &config).await.unwrap();

        let result = client.send_request("ping", None).await;
        assert!(matches!(result, Err(ClientError::Timeout { .. })));

        client.close().await;
    }

    #[tokio::test]
    async fn send_notification_does_not_wait_for_a_response() {
        let config = ClientConfig::for_stdio("test-client", "0.0.1");
        let client = McpClient::connect_stdio("cat", &config).await.unwrap();

        client.send_notification("notifications/initialized", None).await.unwrap();

        client.close().await;
    }

    #[tokio::test]
    async fn close_fails_every_pending_request() {
        let config = ClientConfig::for_stdio("test-client", "0.0.1");
        let client = McpClient::connect_stdio("cat", &config).await.unwrap();

        let client_for_task = client.clone();
        let handle = tokio::spawn(async move { client_for_task.send_request("tools/list", None).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        client.close().await;

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ClientError::Transport(TransportError::Closed))));
    }
}
