//! MCP Core
//!
//! A transport-agnostic Model Context Protocol (MCP) client and server
//! core: JSON-RPC 2.0 framing, the `initialize` handshake state machine,
//! a tool/resource/prompt registry, session management, API-key auth,
//! and graceful shutdown — over both stdio and SSE+HTTP transports.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use mcp_core::config::ServerConfig;
//! use mcp_core::server::McpServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env("mcp-core-demo", env!("CARGO_PKG_VERSION"))?;
//!     let server = McpServer::builder(config)
//!         .tool("echo", "echoes its input", json!({"type": "object"}), |args| async move { Ok(args) })?
//!         .build();
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod demos;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod transport;

pub use client::McpClient;
pub use config::{ClientConfig, ServerConfig};
pub use error::{ClientError, ProtocolError, ToolError};
pub use frame::Frame;
pub use server::McpServer;
