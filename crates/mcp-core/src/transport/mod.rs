//! Transport implementations carrying [`crate::frame::Frame`]s between a
//! client and a server: stdio (pipe-based, directly or via a spawned
//! child process) and SSE+HTTP.

pub mod sse;
pub mod stdio;

pub use stdio::{StdioClientTransport, StdioServerTransport};
