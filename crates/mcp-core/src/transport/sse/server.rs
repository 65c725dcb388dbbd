//! Server side of the SSE transport: the `GET <ssePath>` long-lived
//! stream and the `POST <messagesPath>` ingest endpoint.
//!
//! No Streamable-HTTP `/mcp` single-endpoint variant and no
//! Last-Event-ID replay ring buffer here; outbound delivery goes
//! through the plainer bounded mailbox [`crate::session::SessionRecord`]
//! already implements.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::frame;
use crate::server::McpServer;

/// Shared state for every SSE/HTTP handler.
pub struct SseServerState {
    server: Arc<McpServer>,
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Build the axum router for the SSE transport, bound to `server`'s
/// configured paths. Auth is layered separately by the caller (typically
/// `main.rs`) via [`crate::auth::require_api_key`], since whether auth is
/// even enabled is a deployment decision, not a transport one.
pub fn sse_router(server: Arc<McpServer>) -> Router {
    let sse_path = server.config().sse_path.clone();
    let messages_path = server.config().messages_path.clone();
    let max_body = server.config().max_post_body_bytes;
    let state = Arc::new(SseServerState { server });

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route(&sse_path, get(handle_sse))
        .route(&messages_path, post(handle_messages).layer(DefaultBodyLimit::max(max_body)))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn readiness_check(State(state): State<Arc<SseServerState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "sessions": state.server.sessions().session_count().await,
    }))
}

async fn handle_sse(State(state): State<Arc<SseServerState>>) -> impl IntoResponse {
    let record = state.server.sessions().register().await;
    let session_id = record.id.clone();
    let messages_path = state.server.config().messages_path.clone();

    tracing::info!(session_id = %session_id, "opened SSE stream");

    let endpoint_data = format!("{messages_path}?sessionId={session_id}");
    let endpoint_event = stream::once(async move { Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint_data)) });

    let outbound_stream = stream::unfold(record, |record| async move {
        if record.is_closed().await {
            return None;
        }
        let frames = record.wait_for_outbound().await;
        if frames.is_empty() {
            return None; // closed while we were waiting
        }
        Some((frames, record))
    })
    .flat_map(|frames| stream::iter(frames.into_iter().map(frame_to_event).map(Ok::<_, Infallible>)));

    let combined: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> =
        Box::pin(endpoint_event.chain(outbound_stream));

    (
        [("X-Accel-Buffering", "no"), ("Cache-Control", "no-cache")],
        Sse::new(combined).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping")),
    )
}

fn frame_to_event(frame: crate::frame::Frame) -> Event {
    let bytes = frame::encode(&frame);
    Event::default().data(String::from_utf8_lossy(&bytes).into_owned())
}

async fn handle_messages(
    State(state): State<Arc<SseServerState>>,
    Query(query): Query<MessageQuery>,
    body: axum::body::Bytes,
) -> Response {
    let Some(session_id) = query.session_id else {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "missing sessionId"}))).into_response();
    };

    let Some(record) = state.server.sessions().lookup(&session_id).await else {
        return (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "unknown session"}))).into_response();
    };

    let parsed = match frame::decode(&body) {
        Ok(frame) => frame,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": err.to_string()}))).into_response();
        }
    };

    if let Some(response) = state.server.handle_frame(&record, parsed).await {
        record.push_outbound(response).await;
    }

    StatusCode::ACCEPTED.into_response()
}
