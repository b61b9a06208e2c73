//! Transport abstraction for backend API requests
//!
//! Defines the `Transport` trait that decouples the authenticated client from
//! the HTTP stack. The client hands a fully decorated `ApiRequest` to the
//! transport and gets back either a successful `ApiResponse` or a
//! `TransportError`. Non-2xx answers are failures carrying the whole response
//! (`TransportError::Status`) so callers can inspect status and error body.
//!
//! `ReqwestTransport` is the production implementation; tests substitute
//! scripted in-memory transports.

pub mod http_client;

pub use http_client::{HeaderInjection, ReqwestTransport};

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;

/// Outgoing request descriptor: `{method, path, headers, body}`.
///
/// `path` is relative to the transport's base URL and may carry a query
/// string. Absolute `http(s)://` URLs are passed through untouched.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body and set `content-type: application/json`.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(body)
            .map_err(|e| TransportError::InvalidRequest(format!("serializing body: {e}")))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(encoded));
        Ok(self)
    }

    /// Bearer credential currently attached to this request, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
    }
}

/// A response received from the backend.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| TransportError::Decode(format!("status {}: {e}", self.status)))
    }

    /// Body as UTF-8 text (lossy), for logging and error messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failures reported by a transport.
///
/// Cloneable so that a single failure can be handed to several waiters.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("upstream returned status {}", .0.status)]
    Status(ApiResponse),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl TransportError {
    /// HTTP status of the failed response, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        self.response().map(|r| r.status)
    }

    /// The failed response, if the server answered at all.
    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            TransportError::Status(response) => Some(response),
            _ => None,
        }
    }
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Request-sending primitive used by the authenticated client.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    /// Identifier for logging (e.g. "reqwest")
    fn id(&self) -> &str;

    /// Send one request. Implementations must not retry on their own and must
    /// report non-2xx answers as `TransportError::Status`.
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;
}
