//! End-to-end tests for the SSE+HTTP transport: the `GET <ssePath>` /
//! `POST <messagesPath>` pair driven through the real axum router, the
//! way a browser or HTTP client would see it.
//!
//! These exercise the router directly via `tower::ServiceExt::oneshot`
//! rather than binding a real socket, sharing one `Router` clone (and
//! therefore one `McpServer`/`SessionManager`) across every request in a
//! scenario, the same pattern the teacher's own `oauth_integration_tests.rs`
//! uses for its HTTP-level coverage.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tower::ServiceExt;

use mcp_core::auth::{self, ApiKeyValidator, AuthState, StaticKeyValidator};
use mcp_core::config::ServerConfig;
use mcp_core::error::ToolError;
use mcp_core::server::McpServer;
use mcp_core::transport::sse::sse_router;

// =============================================================================
// Test fixtures
// =============================================================================

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
            Ok::<Value, ToolError>(if sum.fract() == 0.0 { json!(sum as i64) } else { json!(sum) })
        })
        .unwrap()
        .build()
}

fn test_router() -> Router {
    sse_router(test_server())
}

fn init_params() -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {},
        "clientInfo": {"name": "test-client", "version": "1.0"},
    })
}

/// A minimal SSE frame reader good enough for these tests: parses
/// `event:`/`data:` blocks separated by a blank line out of a growing
/// text buffer, the same shape `crate::transport::sse::client` parses in
/// the real client, reimplemented locally since that parser is private.
struct SseFrames {
    buffer: String,
}

impl SseFrames {
    const fn new() -> Self {
        Self { buffer: String::new() }
    }

    fn push(&mut self, chunk: &str) -> Vec<(Option<String>, String)> {
        self.buffer.push_str(chunk);
        let mut out = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let raw: String = self.buffer.drain(..boundary + 2).collect();
            let mut event = None;
            let mut data = Vec::new();
            for line in raw.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    event = Some(value.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.trim().to_string());
                }
            }
            if !data.is_empty() {
                out.push((event, data.join("\n")));
            }
        }
        out
    }
}

type BodyStream = std::pin::Pin<Box<dyn Stream<Item = axum::body::Bytes> + Send>>;

fn body_stream(response: axum::response::Response) -> BodyStream {
    Box::pin(response.into_body().into_data_stream().map(|chunk| chunk.expect("body stream error")))
}

/// Opens the SSE stream and reads until the `endpoint` event arrives,
/// returning the session id plus the still-open stream and parser so the
/// caller can keep reading subsequent response frames with [`next_frame`].
async fn open_sse_session(app: &Router) -> (String, BodyStream, SseFrames) {
    let response = app.clone().oneshot(Request::get("/sse").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "text/event-stream");

    let mut stream = body_stream(response);
    let mut frames = SseFrames::new();

    loop {
        let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("endpoint event did not arrive in time")
            .expect("stream ended before endpoint event");
        for (event, data) in frames.push(&String::from_utf8_lossy(&chunk)) {
            if event.as_deref() == Some("endpoint") {
                let session_id = data.rsplit("sessionId=").next().unwrap().to_string();
                return (session_id, stream, frames);
            }
        }
    }
}

/// Reads chunks from `stream` until the parser yields at least one
/// complete, non-`endpoint` frame, and returns its parsed JSON body.
async fn next_frame(stream: &mut BodyStream, frames: &mut SseFrames) -> Value {
    loop {
        let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("response frame did not arrive in time")
            .expect("stream ended before a response frame arrived");
        for (event, data) in frames.push(&String::from_utf8_lossy(&chunk)) {
            if event.is_none() {
                return serde_json::from_str(&data).expect("frame body is valid JSON");
            }
        }
    }
}

async fn post_message(app: &Router, session_id: &str, body: Value) -> StatusCode {
    let response = app
        .clone()
        .oneshot(
            Request::post(format!("/messages?sessionId={session_id}"))
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    response.status()
}

// =============================================================================
// Scenario 1 -- SSE handshake
// =============================================================================

#[tokio::test]
async fn sse_handshake_delivers_initialize_response_over_the_stream() {
    let app = test_router();
    let (session_id, mut stream, mut frames) = open_sse_session(&app).await;
    assert!(!session_id.is_empty());

    let request = json!({"jsonrpc": "2.0", "id": "1", "method": "initialize", "params": init_params()});
    assert_eq!(post_message(&app, &session_id, request).await, StatusCode::ACCEPTED);

    let response = next_frame(&mut stream, &mut frames).await;
    assert_eq!(response["id"], json!("1"));
    assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(response["result"]["serverInfo"]["name"], "test-server");
}

// =============================================================================
// Scenario 2 -- tool call
// =============================================================================

#[tokio::test]
async fn tool_call_after_handshake_returns_text_content() {
    let app = test_router();
    let (session_id, mut stream, mut frames) = open_sse_session(&app).await;

    let init = json!({"jsonrpc": "2.0", "id": "1", "method": "initialize", "params": init_params()});
    post_message(&app, &session_id, init).await;
    next_frame(&mut stream, &mut frames).await;

    let ack = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
    assert_eq!(post_message(&app, &session_id, ack).await, StatusCode::ACCEPTED);

    let call = json!({
        "jsonrpc": "2.0",
        "id": "2",
        "method": "tools/call",
        "params": {"name": "add", "arguments": {"a": 2, "b": 3}},
    });
    post_message(&app, &session_id, call).await;

    let response = next_frame(&mut stream, &mut frames).await;
    assert_eq!(response["id"], json!("2"));
    assert_eq!(response["result"]["isError"], json!(false));
    assert_eq!(response["result"]["content"][0]["text"], json!("5"));
}

// =============================================================================
// Scenario 3 -- unknown tool
// =============================================================================

#[tokio::test]
async fn unknown_tool_call_returns_invalid_params_error() {
    let app = test_router();
    let (session_id, mut stream, mut frames) = open_sse_session(&app).await;

    let init = json!({"jsonrpc": "2.0", "id": "1", "method": "initialize", "params": init_params()});
    post_message(&app, &session_id, init).await;
    next_frame(&mut stream, &mut frames).await;
    post_message(&app, &session_id, json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).await;

    let call = json!({"jsonrpc": "2.0", "id": "3", "method": "tools/call", "params": {"name": "nope"}});
    post_message(&app, &session_id, call).await;

    let response = next_frame(&mut stream, &mut frames).await;
    assert_eq!(response["error"]["code"], json!(-32602));
    assert!(response["error"]["message"].as_str().unwrap().contains("nope"));
}

// =============================================================================
// Scenario 4 -- call before initialize
// =============================================================================

#[tokio::test]
async fn call_before_initialize_is_invalid_request() {
    let app = test_router();
    let (session_id, mut stream, mut frames) = open_sse_session(&app).await;

    let call = json!({"jsonrpc": "2.0", "id": "4", "method": "tools/list"});
    post_message(&app, &session_id, call).await;

    let response = next_frame(&mut stream, &mut frames).await;
    assert_eq!(response["error"]["code"], json!(-32600));
    assert!(response["error"]["message"].as_str().unwrap().contains("opening"));
}

// =============================================================================
// Scenario 5 -- missing auth
// =============================================================================

#[tokio::test]
async fn missing_api_key_on_secured_path_is_rejected_with_401() {
    let server = McpServer::builder({
        let mut config = ServerConfig::new("secured-server", "0.0.1");
        config.api_keys = vec!["top-secret".to_string()];
        config
    })
    .build();

    let validator: Arc<dyn ApiKeyValidator> = Arc::new(StaticKeyValidator::new(server.config().api_keys.clone()));
    let auth_state = Arc::new(AuthState::new(validator, server.config().secured_paths.clone(), server.config().allow_query_api_key));
    let app = sse_router(server).layer(axum::middleware::from_fn_with_state(auth_state, auth::require_api_key));

    let response = app.oneshot(Request::get("/sse").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(body["message"], "Missing API key");
}

// =============================================================================
// Transport-level error paths
// =============================================================================

#[tokio::test]
async fn post_to_unknown_session_is_404() {
    let app = test_router();
    let response = app
        .oneshot(
            Request::post("/messages?sessionId=does-not-exist")
                .body(Body::from(serde_json::to_vec(&json!({"jsonrpc": "2.0", "method": "ping"})).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn post_with_malformed_json_is_400() {
    let app = test_router();
    let (session_id, _stream, _frames) = open_sse_session(&app).await;
    let response = app
        .oneshot(
            Request::post(format!("/messages?sessionId={session_id}"))
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn post_without_session_id_is_400() {
    let app = test_router();
    let response = app
        .oneshot(
            Request::post("/messages")
                .body(Body::from(serde_json::to_vec(&json!({"jsonrpc": "2.0", "method": "ping"})).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
