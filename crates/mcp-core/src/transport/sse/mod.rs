//! Server-Sent Events + HTTP POST transport: a long-lived GET stream
//! paired with a POST ingest endpoint, bound by a session id.

pub mod client;
pub mod server;

pub use client::SseClientTransport;
pub use server::{sse_router, SseServerState};
