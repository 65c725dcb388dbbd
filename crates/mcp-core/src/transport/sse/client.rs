//! Client side of the SSE transport: a shared `reqwest::Client` with a
//! hand-rolled `eventsource`-style line reader over its streaming body,
//! since no dependency in the stack provides one off the shelf.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};

use crate::error::{TransportError, TransportResult};
use crate::frame::{self, Frame};

/// One parsed SSE event: an optional `event:` line and the `data:`
/// payload (joined across multiple `data:` lines with `\n`, per the SSE
/// spec, though this transport only ever emits single-line payloads).
#[derive(Debug, Clone)]
struct SseEvent {
    event: Option<String>,
    data: String,
}

struct SseEventParser {
    buffer: String,
}

impl SseEventParser {
    const fn new() -> Self {
        Self { buffer: String::new() }
    }

    fn push(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let raw: String = self.buffer.drain(..boundary + 2).collect();
            if let Some(event) = parse_one_event(&raw) {
                events.push(event);
            }
        }
        events
    }
}

fn parse_one_event(raw: &str) -> Option<SseEvent> {
    let mut event_type = None;
    let mut data_lines = Vec::new();
    for line in raw.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim().to_string());
        }
    }
    if data_lines.is_empty() {
        return None;
    }
    Some(SseEvent { event: event_type, data: data_lines.join("\n") })
}

/// A connected SSE client transport: owns the POST side (sending
/// requests/notifications) once the GET stream has delivered the
/// `endpoint` event carrying the session id.
pub struct SseClientTransport {
    http: reqwest::Client,
    base_url: String,
    messages_url: Mutex<Option<String>>,
}

impl SseClientTransport {
    /// Open the SSE stream at `{base_url}{sse_path}`, wait up to
    /// `endpoint_wait_timeout` for the `endpoint` event, and return the
    /// connected transport plus a channel yielding every subsequent
    /// frame the server pushes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] if the GET fails, or
    /// [`TransportError::NotConnected`] if the `endpoint` event doesn't
    /// arrive in time.
    pub async fn connect(
        base_url: &str,
        sse_path: &str,
        endpoint_wait_timeout: Duration,
    ) -> TransportResult<(Arc<Self>, mpsc::UnboundedReceiver<Frame>)> {
        let http = reqwest::Client::new();
        let url = format!("{base_url}{sse_path}");
        let response = http.get(&url).header("Accept", "text/event-stream").send().await?;
        let mut byte_stream = response.bytes_stream();

        let transport = Arc::new(Self { http: http.clone(), base_url: base_url.to_string(), messages_url: Mutex::new(None) });

        let mut parser = SseEventParser::new();
        let (endpoint_tx, endpoint_rx) = tokio::sync::oneshot::channel();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();

        let transport_for_task = transport.clone();
        tokio::spawn(async move {
            let mut endpoint_tx = Some(endpoint_tx);
            while let Some(chunk) = byte_stream.next().await {
                let Ok(bytes) = chunk else {
                    tracing::warn!("SSE stream read error, closing");
                    return;
                };
                let text = String::from_utf8_lossy(&bytes).into_owned();
                for event in parser.push(&text) {
                    match event.event.as_deref() {
                        Some("endpoint") => {
                            *transport_for_task.messages_url.lock().await = Some(event.data.clone());
                            if let Some(tx) = endpoint_tx.take() {
                                let _ = tx.send(());
                            }
                        }
                        _ => match frame::decode(event.data.as_bytes()) {
                            Ok(frame) => {
                                if frame_tx.send(frame).is_err() {
                                    return;
                                }
                            }
                            Err(err) => tracing::warn!(error = %err, "malformed SSE frame, skipping"),
                        },
                    }
                }
            }
        });

        tokio::time::timeout(endpoint_wait_timeout, endpoint_rx).await.map_err(|_| TransportError::NotConnected)?.map_err(|_| TransportError::NotConnected)?;

        Ok((transport, frame_rx))
    }

    /// Send a frame via `POST` to the session's message endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] if the `endpoint` event
    /// hasn't arrived yet, or [`TransportError::Http`] on a request
    /// failure.
    pub async fn send(&self, frame: &Frame) -> TransportResult<()> {
        let path = self.messages_url.lock().await.clone().ok_or(TransportError::NotConnected)?;
        let url = format!("{}{}", self.base_url, path);
        let body = frame::encode(frame);
        let response = self.http.post(&url).header("Content-Type", "application/json").body(body).send().await?;
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "unexpected status posting MCP message");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_endpoint_event() {
        let mut parser = SseEventParser::new();
        let events = parser.push("event: endpoint\ndata: /messages?sessionId=abc\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("endpoint"));
        assert_eq!(events[0].data, "/messages?sessionId=abc");
    }

    #[test]
    fn parses_plain_data_event_across_chunks() {
        let mut parser = SseEventParser::new();
        let mut events = parser.push("data: {\"jsonrpc\":\"2.0\"");
        assert!(events.is_empty());
        events = parser.push(",\"id\":1,\"result\":{}}\n\n");
        assert_eq!(events.len(), 1);
        assert!(events[0].event.is_none());
    }

    #[test]
    fn ignores_events_with_no_data() {
        let mut parser = SseEventParser::new();
        let events = parser.push(": keep-alive comment\n\n");
        assert!(events.is_empty());
    }
}
