//! Configuration for the MCP core client/server.

use std::time::Duration;

/// Protocol and resource-limit constants. Each has a corresponding
/// configurable field on [`ServerConfig`]/[`ClientConfig`]; these are
/// the defaults documented for each.
pub mod defaults {
    use std::time::Duration;

    /// Per-request timeout on the SSE transport.
    pub const SSE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Per-request timeout on the stdio transport (higher: local
    /// processes may be slow to warm up).
    pub const STDIO_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// How long a client waits for the `endpoint` SSE event after
    /// opening the stream.
    pub const ENDPOINT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Idle session eviction threshold.
    pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

    /// Interval between idle-session sweeps.
    pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

    /// Overall time budget for draining all sessions during shutdown.
    pub const SHUTDOWN_DRAIN_BUDGET: Duration = Duration::from_secs(10);

    /// Maximum size of a single POST body.
    pub const MAX_POST_BODY_BYTES: usize = 1024 * 1024;

    /// Maximum size of a single stdio line.
    pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

    /// Bound on a session's outbound SSE queue; overflow drops the
    /// oldest unsent frame.
    pub const SSE_QUEUE_CAPACITY: usize = 256;

    /// Default SSE stream path.
    pub const SSE_PATH: &str = "/sse";

    /// Default message ingest path.
    pub const MESSAGES_PATH: &str = "/messages";

    /// Default API key header name.
    pub const API_KEY_HEADER: &str = "X-API-Key";

    /// Default API key query parameter name.
    pub const API_KEY_QUERY_PARAM: &str = "api_key";

    /// Protocol version string advertised during `initialize`.
    pub const PROTOCOL_VERSION: &str = "2024-11-05";
}

/// Which transport a server instance should bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TransportKind {
    /// Standard input/output, typically a locally spawned child process.
    #[default]
    Stdio,
    /// Server-Sent Events + HTTP POST.
    Sse,
}

/// Server-side configuration: everything the CLI entry point assembles
/// and hands to [`crate::server::McpServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Which transport to run.
    pub transport: TransportKind,

    /// Bind host for the SSE transport.
    pub bind_host: String,

    /// Bind port for the SSE transport.
    pub bind_port: u16,

    /// SSE GET endpoint path.
    pub sse_path: String,

    /// Message POST endpoint path.
    pub messages_path: String,

    /// API keys accepted by the auth middleware. Empty means auth is
    /// disabled (an always-succeed validator is installed, with a
    /// startup warning).
    pub api_keys: Vec<String>,

    /// Paths secured by the auth middleware. Defaults to
    /// `{sse_path, messages_path}`.
    pub secured_paths: Vec<String>,

    /// Whether to accept the API key from a query parameter in addition
    /// to the header. Should be disabled in production.
    pub allow_query_api_key: bool,

    /// Server name advertised in `initialize`.
    pub server_name: String,

    /// Server version advertised in `initialize`.
    pub server_version: String,

    /// Optional free-text instructions advertised in `initialize`.
    pub instructions: Option<String>,

    /// Idle session eviction threshold.
    pub idle_timeout: Duration,

    /// Interval between idle-session sweeps.
    pub sweep_interval: Duration,

    /// Overall time budget for graceful shutdown draining.
    pub shutdown_drain_budget: Duration,

    /// Maximum size of a single POST body.
    pub max_post_body_bytes: usize,

    /// Bound on a session's outbound SSE queue.
    pub sse_queue_capacity: usize,
}

impl ServerConfig {
    /// Construct a configuration with the documented defaults and the
    /// given server identity.
    #[must_use]
    pub fn new(server_name: impl Into<String>, server_version: impl Into<String>) -> Self {
        let sse_path = defaults::SSE_PATH.to_string();
        let messages_path = defaults::MESSAGES_PATH.to_string();
        Self {
            transport: TransportKind::Stdio,
            bind_host: "0.0.0.0".to_string(),
            bind_port: 8000,
            secured_paths: vec![sse_path.clone(), messages_path.clone()],
            sse_path,
            messages_path,
            api_keys: Vec::new(),
            allow_query_api_key: true,
            server_name: server_name.into(),
            server_version: server_version.into(),
            instructions: None,
            idle_timeout: defaults::IDLE_TIMEOUT,
            sweep_interval: defaults::SWEEP_INTERVAL,
            shutdown_drain_budget: defaults::SHUTDOWN_DRAIN_BUDGET,
            max_post_body_bytes: defaults::MAX_POST_BODY_BYTES,
            sse_queue_capacity: defaults::SSE_QUEUE_CAPACITY,
        }
    }

    /// Whether any API keys are configured; if not, auth is disabled.
    #[must_use]
    pub fn auth_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    /// Build configuration from environment variables, falling back to
    /// the documented defaults. Command-line flags (in `main.rs`)
    /// override the result of this afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if `MCP_BIND_PORT` is set but not a valid `u16`.
    pub fn from_env(server_name: impl Into<String>, server_version: impl Into<String>) -> anyhow::Result<Self> {
        let mut config = Self::new(server_name, server_version);

        if let Ok(port) = std::env::var("MCP_BIND_PORT") {
            config.bind_port = port.parse()?;
        }
        if let Ok(host) = std::env::var("MCP_BIND_HOST") {
            config.bind_host = host;
        }
        if let Ok(keys) = std::env::var("MCP_API_KEYS") {
            config.api_keys = keys.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
        }
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("mcp-core", env!("CARGO_PKG_VERSION"))
    }
}

/// Client-side configuration for [`crate::client::McpClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Client name sent during `initialize`.
    pub client_name: String,

    /// Client version sent during `initialize`.
    pub client_version: String,

    /// Per-request timeout. Defaults depend on the transport in use;
    /// callers pick the right default via [`ClientConfig::for_stdio`] /
    /// [`ClientConfig::for_sse`].
    pub request_timeout: Duration,

    /// How long to wait for the SSE `endpoint` event.
    pub endpoint_wait_timeout: Duration,
}

impl ClientConfig {
    /// Configuration tuned for a stdio transport (60s request timeout).
    #[must_use]
    pub fn for_stdio(client_name: impl Into<String>, client_version: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            client_version: client_version.into(),
            request_timeout: defaults::STDIO_REQUEST_TIMEOUT,
            endpoint_wait_timeout: defaults::ENDPOINT_WAIT_TIMEOUT,
        }
    }

    /// Configuration tuned for an SSE transport (30s request timeout).
    #[must_use]
    pub fn for_sse(client_name: impl Into<String>, client_version: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            client_version: client_version.into(),
            request_timeout: defaults::SSE_REQUEST_TIMEOUT,
            endpoint_wait_timeout: defaults::ENDPOINT_WAIT_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_has_documented_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.sse_path, "/sse");
        assert_eq!(config.messages_path, "/messages");
        assert_eq!(config.idle_timeout, Duration::from_secs(1800));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert!(!config.auth_enabled());
    }

    #[test]
    fn auth_enabled_tracks_api_keys() {
        let mut config = ServerConfig::default();
        assert!(!config.auth_enabled());
        config.api_keys.push("secret".to_string());
        assert!(config.auth_enabled());
    }

    #[test]
    fn secured_paths_default_to_sse_and_messages() {
        let config = ServerConfig::default();
        assert!(config.secured_paths.contains(&"/sse".to_string()));
        assert!(config.secured_paths.contains(&"/messages".to_string()));
    }

    #[test]
    fn client_config_timeouts_differ_by_transport() {
        let stdio = ClientConfig::for_stdio("c", "1");
        let sse = ClientConfig::for_sse("c", "1");
        assert_eq!(stdio.request_timeout, Duration::from_secs(60));
        assert_eq!(sse.request_timeout, Duration::from_secs(30));
    }
}
