//! JSON-RPC 2.0 frame codec.
//!
//! Pure encode/decode functions with no I/O. Transports own the framing
//! (a trailing `\n` for stdio, `data: ...\n\n` for SSE) — this module
//! only turns bytes into a [`Frame`] and back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CodecError, CodecResult};

const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC 2.0 request or response identifier. Opaque: an
/// implementation must echo back the exact id it received, including
/// its JSON type (string vs integer).
pub type Id = Value;

/// A single JSON-RPC 2.0 message: request, notification, or response
/// (success or error). Classified on decode by which of `id`, `method`,
/// `result`, `error` are present.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A request expecting a response, correlated by `id`.
    Request {
        /// Request identifier, echoed verbatim in the response.
        id: Id,
        /// Method name.
        method: String,
        /// Method parameters, if any.
        params: Option<Value>,
    },
    /// A one-way message; no response is ever sent.
    Notification {
        /// Method name.
        method: String,
        /// Method parameters, if any.
        params: Option<Value>,
    },
    /// A successful response to a request.
    Response {
        /// Echoes the request's `id`.
        id: Id,
        /// The handler's result value.
        result: Value,
    },
    /// An error response to a request (or to an unparseable message,
    /// in which case `id` is `Value::Null`).
    Error {
        /// Echoes the request's `id`, or `Null` for parse errors.
        id: Id,
        /// JSON-RPC error code.
        code: i64,
        /// Human-readable error message.
        message: String,
        /// Optional structured error payload.
        data: Option<Value>,
    },
}

impl Frame {
    /// Build a request frame.
    #[must_use]
    pub fn request(id: impl Into<Id>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request { id: id.into(), method: method.into(), params }
    }

    /// Build a notification frame.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification { method: method.into(), params }
    }

    /// Build a success response frame.
    #[must_use]
    pub fn response(id: Id, result: Value) -> Self {
        Self::Response { id, result }
    }

    /// Build an error response frame.
    #[must_use]
    pub fn error(id: Id, code: i64, message: impl Into<String>) -> Self {
        Self::Error { id, code, message: message.into(), data: None }
    }

    /// Build an error response frame carrying structured `data`.
    #[must_use]
    pub fn error_with_data(id: Id, code: i64, message: impl Into<String>, data: Value) -> Self {
        Self::Error { id, code, message: message.into(), data: Some(data) }
    }

    /// The frame's `id`, if it has one (requests and responses do,
    /// notifications don't).
    #[must_use]
    pub fn id(&self) -> Option<&Id> {
        match self {
            Self::Request { id, .. } | Self::Response { id, .. } | Self::Error { id, .. } => Some(id),
            Self::Notification { .. } => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFrame {
    jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<WireError>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireError {
    code: i64,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Serialize a [`Frame`] to canonical JSON bytes, with no trailing
/// newline — the transport is responsible for framing.
#[must_use]
pub fn encode(frame: &Frame) -> Vec<u8> {
    let wire = match frame {
        Frame::Request { id, method, params } => WireFrame {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.clone()),
            method: Some(method.clone()),
            params: params.clone(),
            result: None,
            error: None,
        },
        Frame::Notification { method, params } => WireFrame {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: Some(method.clone()),
            params: params.clone(),
            result: None,
            error: None,
        },
        Frame::Response { id, result } => WireFrame {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.clone()),
            method: None,
            params: None,
            result: Some(result.clone()),
            error: None,
        },
        Frame::Error { id, code, message, data } => WireFrame {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.clone()),
            method: None,
            params: None,
            result: None,
            error: Some(WireError { code: *code, message: message.clone(), data: data.clone() }),
        },
    };
    // serde_json::to_vec never fails for these types (no non-finite
    // floats, no non-string map keys).
    serde_json::to_vec(&wire).unwrap_or_default()
}

/// Parse bytes into a [`Frame`], classifying the variant by which of
/// `id`/`method`/`result`/`error` are present:
/// - `method` and `id` present -> request
/// - `method` present, `id` absent -> notification
/// - `id` present and (`result` or `error`) present -> response
/// - anything else -> [`CodecError::MalformedFrame`]
pub fn decode(bytes: &[u8]) -> CodecResult<Frame> {
    let wire: WireFrame = serde_json::from_slice(bytes)?;

    match (wire.method, wire.id, wire.result, wire.error) {
        (Some(method), Some(id), None, None) => Ok(Frame::Request { id, method, params: wire.params }),
        (Some(method), None, None, None) => Ok(Frame::Notification { method, params: wire.params }),
        (None, Some(id), Some(result), None) => Ok(Frame::Response { id, result }),
        (None, Some(id), None, Some(err)) => {
            Ok(Frame::Error { id, code: err.code, message: err.message, data: err.data })
        }
        (None, None, Some(_) | None, Some(_) | None) if wire.params.is_none() => {
            Err(CodecError::MalformedFrame("message has neither method nor id/result/error".into()))
        }
        _ => Err(CodecError::MalformedFrame(
            "message mixes incompatible fields (e.g. both result and error, or params without method)".into(),
        )),
    }
}

/// Parse one line out of a growable buffer, for the stdio line-delimited
/// framing. Splits on `\n`, skips blank lines, and rejects lines larger
/// than `max_line_bytes`. Returns the parsed frame (or decode error) and
/// the number of bytes consumed from `buffer`; returns `None` bytes
/// consumed of 0 if no complete line is yet available.
pub fn try_parse_line(buffer: &[u8], max_line_bytes: usize) -> Option<(CodecResult<Frame>, usize)> {
    let newline_pos = buffer.iter().position(|&b| b == b'\n')?;
    let line = &buffer[..newline_pos];
    let consumed = newline_pos + 1;

    if line.len() > max_line_bytes {
        return Some((Err(CodecError::LineTooLong { limit: max_line_bytes }), consumed));
    }

    let trimmed = trim_ascii_whitespace(line);
    if trimmed.is_empty() {
        // Blank line: consumed, but nothing to report. Callers loop
        // until this returns a frame or they run out of buffer.
        return Some((Err(CodecError::MalformedFrame("blank line".into())), consumed));
    }

    Some((decode(trimmed), consumed))
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |p| p + 1);
    &bytes[start..end]
}
