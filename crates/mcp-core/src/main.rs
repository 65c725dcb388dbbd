//! mcp-core demo server - Entry Point
//!
//! Runs the demo tool/resource/prompt set over stdio or SSE+HTTP.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_core::config::{ServerConfig, TransportKind};
use mcp_core::demos;
use mcp_core::server::McpServer;

#[derive(Parser, Debug)]
#[command(name = "mcp-core-demo")]
#[command(about = "Demo Model Context Protocol server")]
#[command(version)]
struct Cli {
    /// Transport mode: stdio or sse
    #[arg(long, default_value = "stdio")]
    transport: TransportKind,

    /// Bind host (only used with --transport sse)
    #[arg(long, default_value = "0.0.0.0", env = "MCP_BIND_HOST")]
    bind_host: String,

    /// Bind port (only used with --transport sse)
    #[arg(long, default_value = "8000", env = "MCP_BIND_PORT")]
    bind_port: u16,

    /// Comma-separated API keys; if empty, auth is disabled.
    #[arg(long, env = "MCP_API_KEYS")]
    api_keys: Option<String>,

    /// Accept the API key from a query parameter in addition to the header.
    #[arg(long)]
    allow_query_api_key: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), transport = ?cli.transport, "starting mcp-core demo server");

    let mut config = ServerConfig::new("mcp-core-demo", env!("CARGO_PKG_VERSION"));
    config.transport = cli.transport;
    config.bind_host = cli.bind_host;
    config.bind_port = cli.bind_port;
    config.allow_query_api_key = cli.allow_query_api_key;
    if let Some(keys) = cli.api_keys {
        config.api_keys = keys.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
    }

    let server = demos::register_all(McpServer::builder(config)).build();
    server.run().await
}
