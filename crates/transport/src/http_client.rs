//! reqwest-backed transport.
//!
//! Joins request paths onto the configured API base URL, injects static
//! headers from config, applies the per-request timeout, and keeps a cookie
//! jar so the HttpOnly refresh cookie set by login/refresh responses is sent
//! back on later refresh calls.

use crate::{ApiRequest, ApiResponse, Result, Transport, TransportError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Header injection rule (name + value pair from config).
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

/// Production transport over a shared `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    headers: Vec<HeaderInjection>,
}

impl ReqwestTransport {
    /// Build a transport with its own cookie-enabled client.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        headers: Vec<HeaderInjection>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| TransportError::InvalidRequest(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
            headers,
        })
    }

    /// Resolve a request path against the base URL.
    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Inject configured headers (add if not present, replace if present).
    /// The Authorization header belongs to the credential layer and is never
    /// touched here.
    fn apply_static_headers(&self, headers: &mut HeaderMap) {
        for injection in &self.headers {
            let name = match HeaderName::from_str(&injection.name) {
                Ok(n) => n,
                Err(e) => {
                    warn!(header = %injection.name, error = %e, "skipping invalid header name");
                    continue;
                }
            };
            if name == reqwest::header::AUTHORIZATION {
                warn!(header = %injection.name, "refusing to overwrite authorization header");
                continue;
            }
            let value = match HeaderValue::from_str(&injection.value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(header = %injection.name, error = %e, "skipping invalid header value");
                    continue;
                }
            };
            headers.insert(name, value);
        }
    }
}

impl Transport for ReqwestTransport {
    fn id(&self) -> &str {
        "reqwest"
    }

    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>> {
        Box::pin(async move {
            let mut headers = request.headers.clone();
            self.apply_static_headers(&mut headers);

            let mut builder = self
                .client
                .request(request.method.clone(), self.url_for(&request.path))
                .headers(headers)
                .timeout(self.timeout);
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let upstream = builder.send().await.map_err(map_send_error)?;
            let status = upstream.status().as_u16();
            let headers = upstream.headers().clone();
            let body = upstream.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(format!("reading response body: {e}"))
                } else {
                    TransportError::Connect(format!("reading response body: {e}"))
                }
            })?;

            let response = ApiResponse {
                status,
                headers,
                body,
            };
            if response.is_success() {
                Ok(response)
            } else {
                debug!(path = %request.path, status, "backend returned error status");
                Err(TransportError::Status(response))
            }
        })
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_builder() {
        TransportError::InvalidRequest(e.to_string())
    } else {
        TransportError::Connect(e.to_string())
    }
}
