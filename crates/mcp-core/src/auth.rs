//! API-key auth middleware gating SSE/HTTP endpoints.
//!
//! A validator trait, a static-key implementation, and an
//! always-succeed implementation for explicitly-disabled-auth
//! deployments.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::Value;

use crate::config::defaults;

/// Identity attached to a request once its API key validates.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Opaque identifier for the authenticated caller.
    pub user_id: String,
    /// Arbitrary claims associated with the key.
    pub claims: HashMap<String, Value>,
}

/// Validates an API key and resolves it to an identity. Implementations
/// must not block; all calls here are synchronous by contract since key
/// lookup is expected to be an in-memory set or map.
pub trait ApiKeyValidator: Send + Sync {
    /// Whether `key` is currently valid.
    fn is_valid(&self, key: &str) -> bool;

    /// The user id a valid key resolves to.
    fn user_id_for(&self, key: &str) -> Option<String>;

    /// Arbitrary claims a valid key carries. Defaults to empty.
    fn claims_for(&self, _key: &str) -> HashMap<String, Value> {
        HashMap::new()
    }
}

/// Validates against a fixed set of keys, configured at startup.
pub struct StaticKeyValidator {
    keys: HashSet<String>,
}

impl StaticKeyValidator {
    /// Build a validator from a configured key list.
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { keys: keys.into_iter().map(Into::into).collect() }
    }
}

impl ApiKeyValidator for StaticKeyValidator {
    fn is_valid(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn user_id_for(&self, key: &str) -> Option<String> {
        self.keys.contains(key).then(|| key.to_string())
    }
}

/// Accepts any key (including an absent one — callers should route
/// around the header check entirely when this is installed, but it also
/// behaves correctly if they don't). Used for deployments that
/// explicitly disable auth; emits a startup warning since this is
/// rarely what an operator actually wants in production.
pub struct AlwaysSucceedValidator;

impl AlwaysSucceedValidator {
    /// Construct the validator, logging the disabled-auth warning.
    #[must_use]
    pub fn new() -> Self {
        tracing::warn!("API key authentication is disabled; all requests will be accepted");
        Self
    }
}

impl Default for AlwaysSucceedValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiKeyValidator for AlwaysSucceedValidator {
    fn is_valid(&self, _key: &str) -> bool {
        true
    }

    fn user_id_for(&self, key: &str) -> Option<String> {
        Some(if key.is_empty() { "anonymous".to_string() } else { key.to_string() })
    }
}

/// Shared state for the [`require_api_key`] middleware.
pub struct AuthState {
    /// Validator consulted for every secured-path request.
    pub validator: Arc<dyn ApiKeyValidator>,
    /// Paths this middleware actually enforces; everything else passes
    /// through untouched.
    pub secured_paths: HashSet<String>,
    /// Header name carrying the API key.
    pub header_name: String,
    /// Whether a query parameter is also accepted.
    pub allow_query_api_key: bool,
    /// Query parameter name, when accepted.
    pub query_param_name: String,
}

impl AuthState {
    /// Build auth state from server configuration pieces (kept separate
    /// from [`crate::config::ServerConfig`] so this module has no
    /// dependency on the rest of the config struct's fields).
    #[must_use]
    pub fn new(validator: Arc<dyn ApiKeyValidator>, secured_paths: impl IntoIterator<Item = String>, allow_query_api_key: bool) -> Self {
        Self {
            validator,
            secured_paths: secured_paths.into_iter().collect(),
            header_name: defaults::API_KEY_HEADER.to_string(),
            allow_query_api_key,
            query_param_name: defaults::API_KEY_QUERY_PARAM.to_string(),
        }
    }
}

fn extract_key(req: &Request, state: &AuthState) -> Option<String> {
    if let Some(value) = req.headers().get(&state.header_name) {
        if let Ok(value) = value.to_str() {
            return Some(value.to_string());
        }
    }
    if state.allow_query_api_key {
        let query = req.uri().query()?;
        for pair in query.split('&') {
            let mut parts = pair.splitn(2, '=');
            if parts.next() == Some(state.query_param_name.as_str()) {
                return parts.next().map(str::to_string);
            }
        }
    }
    None
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "error": "Unauthorized", "message": message }))).into_response()
}

/// Axum middleware: missing key -> 401, invalid key -> 401, valid key ->
/// [`AuthContext`] attached as a request extension and the request
/// proceeds.
pub async fn require_api_key(State(state): State<Arc<AuthState>>, mut req: Request, next: Next) -> Response {
    if !state.secured_paths.contains(req.uri().path()) {
        return next.run(req).await;
    }

    let Some(key) = extract_key(&req, &state) else {
        return unauthorized("Missing API key");
    };

    if !state.validator.is_valid(&key) {
        return unauthorized("Invalid API key");
    }

    let user_id = state.validator.user_id_for(&key).unwrap_or_default();
    let claims = state.validator.claims_for(&key);
    req.extensions_mut().insert(AuthContext { user_id, claims });

    next.run(req).await
}
