//! Fuzzing library for mcp-core.
//!
//! This crate provides fuzzing targets for the frame codec, the one
//! place this crate parses fully untrusted bytes (a stdio line or an
//! SSE POST body).
//!
//! # Usage
//!
//! ```bash
//! cd crates/sentinel-fuzz
//! cargo +nightly fuzz run fuzz_frame_decode -- -max_total_time=60
//! ```

pub use mcp_core::frame;
