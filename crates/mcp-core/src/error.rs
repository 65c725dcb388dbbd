//! Error types for the MCP core crate.
//!
//! Uses `thiserror` for structured error handling with automatic `From`
//! implementations, following the same boundary-per-enum split the
//! protocol distinguishes: codec errors never see the network, transport
//! errors never see a malformed frame, and tool errors never escape as a
//! JSON-RPC error response.

/// JSON-RPC error code for a parse failure (invalid JSON).
pub const PARSE_ERROR: i64 = -32700;
/// JSON-RPC error code for a malformed request or a call outside the
/// protocol state window.
pub const INVALID_REQUEST: i64 = -32600;
/// JSON-RPC error code for an unregistered method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC error code for a request whose params fail to bind.
pub const INVALID_PARAMS: i64 = -32602;
/// JSON-RPC error code for an uncaught handler failure.
pub const INTERNAL_ERROR: i64 = -32603;

/// Errors raised while decoding bytes into a [`crate::frame::Frame`].
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    /// The bytes were not valid JSON.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The JSON was valid but didn't match any frame shape (e.g. both
    /// `result` and `error` present, or neither `id` nor `method`).
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A stdio line exceeded the configured size cap.
    #[error("line exceeds maximum size of {limit} bytes")]
    LineTooLong {
        /// The configured maximum line size.
        limit: usize,
    },
}

impl CodecError {
    /// The JSON-RPC error code this codec failure maps to.
    #[must_use]
    pub const fn rpc_code(&self) -> i64 {
        match self {
            Self::Parse(_) | Self::LineTooLong { .. } => PARSE_ERROR,
            Self::MalformedFrame(_) => INVALID_REQUEST,
        }
    }
}

/// Protocol-level errors: bad method, bad params, or a call made outside
/// the handshake state window. Always surfaced as a JSON-RPC error
/// response, never as a tool-level failure.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    /// No handler is registered for the requested method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// `params` failed to deserialize into the handler's expected type,
    /// or a required argument was missing.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The method was called while the session was in a state that
    /// doesn't permit it (e.g. `tools/call` before `initialize`).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An application-defined error in the -32000..-32099 range
    /// (resource not found, prompt not found, etc).
    #[error("{message}")]
    Application {
        /// Error code, expected to fall in -32000..=-32099.
        code: i64,
        /// Human-readable message.
        message: String,
    },

    /// A handler raised an error that doesn't fit the other variants.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    /// The JSON-RPC error code for this error.
    #[must_use]
    pub const fn rpc_code(&self) -> i64 {
        match self {
            Self::MethodNotFound(_) => METHOD_NOT_FOUND,
            Self::InvalidParams(_) => INVALID_PARAMS,
            Self::InvalidRequest(_) => INVALID_REQUEST,
            Self::Application { code, .. } => *code,
            Self::Internal(_) => INTERNAL_ERROR,
        }
    }

    /// Create an application-defined error, clamping the code into the
    /// reserved -32000..=-32099 range if it falls outside it.
    #[must_use]
    pub fn application(code: i64, message: impl Into<String>) -> Self {
        let code = if (-32099..=-32000).contains(&code) { code } else { -32000 };
        Self::Application { code, message: message.into() }
    }
}

/// Errors raised by a tool/resource/prompt handler. Captured by the
/// registry and wrapped into a successful response (`isError: true`)
/// rather than propagated as a JSON-RPC error — see
/// [`crate::server::registry::ToolRegistry::call`].
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    /// Input validation failed before the handler ran.
    #[error("validation error for '{field}': {message}")]
    Validation {
        /// Field that failed validation.
        field: String,
        /// Validation error message.
        message: String,
    },

    /// The handler itself returned an error.
    #[error("{0}")]
    Handler(String),

    /// Serializing the handler's return value failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ToolError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    /// Create a handler error from any displayable cause.
    #[must_use]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// User-facing message placed in the text content block of a
    /// `ToolCallResult { isError: true }` response.
    #[must_use]
    pub fn to_user_message(&self) -> String {
        match self {
            Self::Validation { field, message } => {
                format!("Invalid input for '{field}': {message}")
            }
            _ => self.to_string(),
        }
    }
}

/// Errors surfaced by a transport (stdio pipe, SSE connection) to its
/// owner. A transport error always transitions the transport to
/// `Closed` and fails every pending completion on it.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The underlying I/O stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `start()` was called a second time.
    #[error("transport already started")]
    AlreadyStarted,

    /// `send()`/`request()` was called after `close()`.
    #[error("transport is closed")]
    Closed,

    /// The HTTP layer returned an unexpected status or failed outright.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// No session id was supplied, or it doesn't match any known session.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// The `endpoint` SSE event did not arrive within
    /// `endpoint_wait_timeout`.
    #[error("not connected: endpoint event timed out")]
    NotConnected,
}

/// Errors surfaced to a client caller of [`crate::client::McpClient`].
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// The transport failed or was closed before a response arrived.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server responded with a JSON-RPC error.
    #[error("server error {code}: {message}")]
    Server {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The request exceeded its deadline with no response.
    #[error("request '{method}' timed out")]
    Timeout {
        /// The method name of the timed-out request.
        method: String,
    },

    /// The response could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Fatal configuration errors. The only error class that aborts the
/// process (at startup, before any transport is accepted).
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Two tools were registered under the same name.
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),

    /// Two resources were registered under the same name.
    #[error("duplicate resource name: {0}")]
    DuplicateResource(String),

    /// Two prompts were registered under the same name.
    #[error("duplicate prompt name: {0}")]
    DuplicatePrompt(String),

    /// The configured bind address could not be parsed.
    #[error("invalid bind address '{0}': {1}")]
    InvalidBindAddress(String, std::net::AddrParseError),
}

/// Result type alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
/// Result type alias for protocol dispatch operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
/// Result type alias for tool/resource/prompt handler operations.
pub type ToolResult<T> = Result<T, ToolError>;
/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
/// Result type alias for client-facing operations.
pub type ClientResult<T> = Result<T, ClientError>;
/// Result type alias for startup configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_rpc_codes() {
        assert_eq!(ProtocolError::MethodNotFound("x".into()).rpc_code(), METHOD_NOT_FOUND);
        assert_eq!(ProtocolError::InvalidParams("x".into()).rpc_code(), INVALID_PARAMS);
        assert_eq!(ProtocolError::InvalidRequest("x".into()).rpc_code(), INVALID_REQUEST);
        assert_eq!(ProtocolError::Internal("x".into()).rpc_code(), INTERNAL_ERROR);
    }

    #[test]
    fn application_error_clamps_code_range() {
        let err = ProtocolError::application(-1, "bad code");
        assert_eq!(err.rpc_code(), -32000);

        let err = ProtocolError::application(-32042, "resource not found");
        assert_eq!(err.rpc_code(), -32042);
    }

    #[test]
    fn tool_error_user_message() {
        let err = ToolError::validation("name", "must not be empty");
        let msg = err.to_user_message();
        assert!(msg.contains("name"));
        assert!(msg.contains("must not be empty"));
    }

    #[test]
    fn codec_error_rpc_codes() {
        let malformed = CodecError::MalformedFrame("mixed result/error".into());
        assert_eq!(malformed.rpc_code(), INVALID_REQUEST);

        let too_long = CodecError::LineTooLong { limit: 16 * 1024 * 1024 };
        assert_eq!(too_long.rpc_code(), PARSE_ERROR);
    }
}
