//! HTTP proxy logic
//!
//! Receives inbound requests, strips hop-by-hop headers and any caller
//! credential, and forwards them through `AuthClient`, which attaches the
//! service's access credential and handles refresh. Backend responses are
//! returned verbatim, including error statuses.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use auth_client::AuthClient;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{error, instrument, warn};
use transport::{ApiRequest, ApiResponse, TransportError};

use crate::metrics;

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Request headers owned by the service rather than the caller: the
/// credential comes from the holder, cookies from the transport's jar, and
/// framing headers from reqwest.
const SERVICE_OWNED_REQUEST_HEADERS: &[&str] = &["authorization", "cookie", "host", "content-length"];

/// Response headers never handed back to callers; the refresh cookie stays
/// inside the service.
const SERVICE_OWNED_RESPONSE_HEADERS: &[&str] = &["set-cookie", "content-length"];

/// Maximum inbound body size.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state passed to the proxy handler via axum State extractor
#[derive(Clone)]
pub struct ProxyState {
    pub client: Arc<AuthClient>,
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    pub in_flight: Arc<AtomicU64>,
}

/// Decrements the in-flight counter when the request finishes, however it
/// finishes.
struct InFlightGuard(Arc<AtomicU64>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Request identifier echoed in error bodies and logs.
pub fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

/// JSON error response: {"error":{"type":"...","message":"...","request_id":"req_..."}}
pub fn error_response(
    status: StatusCode,
    error_type: &str,
    message: &str,
    request_id: &str,
) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Convert a backend response into an axum response, dropping hop-by-hop
/// and service-owned headers.
pub fn backend_response(response: &ApiResponse, request_id: &str) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        let name_str = name.as_str();
        if !is_hop_by_hop(name_str) && !is_listed(SERVICE_OWNED_RESPONSE_HEADERS, name_str) {
            builder = builder.header(name, value);
        }
    }
    builder
        .body(axum::body::Body::from(response.body.clone()))
        .unwrap_or_else(|e| {
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "proxy_error",
                &format!("response build error: {e}"),
                request_id,
            )
        })
}

/// Map a client failure to the response a local caller sees.
///
/// Backend answers (any status) pass through verbatim; the service only
/// speaks for itself when the backend could not be reached or the session
/// could not be renewed.
pub fn client_error_response(err: &auth_client::Error, request_id: &str) -> Response {
    match err {
        auth_client::Error::Transport(TransportError::Status(response)) => {
            backend_response(response, request_id)
        }
        auth_client::Error::Transport(TransportError::Timeout(msg)) => {
            metrics::record_upstream_error("timeout");
            error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "upstream_timeout",
                &format!("backend timeout: {msg}"),
                request_id,
            )
        }
        auth_client::Error::Transport(TransportError::Connect(msg)) => {
            metrics::record_upstream_error("connection");
            error_response(
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                &format!("backend unreachable: {msg}"),
                request_id,
            )
        }
        auth_client::Error::Transport(TransportError::InvalidRequest(msg)) => error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            msg,
            request_id,
        ),
        auth_client::Error::Transport(TransportError::Decode(msg))
        | auth_client::Error::Decode(msg) => {
            metrics::record_upstream_error("decode");
            error_response(
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                &format!("unexpected backend response: {msg}"),
                request_id,
            )
        }
        auth_client::Error::Refresh(e) => {
            metrics::record_upstream_error("session_expired");
            error_response(
                StatusCode::UNAUTHORIZED,
                "session_expired",
                &format!("session expired, log in again: {e}"),
                request_id,
            )
        }
    }
}

/// Copy caller headers that may be forwarded to the backend.
fn forwardable_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in inbound {
        let name_str = name.as_str();
        if !is_hop_by_hop(name_str) && !is_listed(SERVICE_OWNED_REQUEST_HEADERS, name_str) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Proxy an inbound request to the backend through the authenticated client.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn proxy_request(
    state: &ProxyState,
    request: axum::http::Request<axum::body::Body>,
    request_id: String,
) -> Response {
    state.requests_total.fetch_add(1, Ordering::Relaxed);
    let _in_flight = InFlightGuard::enter(&state.in_flight);
    let started = Instant::now();

    let method = request.method().clone();
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().trim_start_matches('/').to_string())
        .unwrap_or_default();
    let headers = forwardable_headers(request.headers());

    let body: Bytes = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            error!(error = %e, "failed to read request body");
            let response = error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                &format!("invalid request body: {e}"),
                &request_id,
            );
            metrics::record_request(400, method.as_str(), started.elapsed().as_secs_f64());
            return response;
        }
    };

    let mut api_request = ApiRequest::new(method.clone(), path);
    api_request.headers = headers;
    if !body.is_empty() {
        api_request.body = Some(body);
    }

    let response = match state.client.send(api_request).await {
        Ok(upstream) => backend_response(&upstream, &request_id),
        Err(e) => {
            if e.status().is_none() {
                state.errors_total.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "backend request failed");
            }
            client_error_response(&e, &request_id)
        }
    };

    metrics::record_request(
        response.status().as_u16(),
        method.as_str(),
        started.elapsed().as_secs_f64(),
    );
    metrics::set_session_authenticated(state.client.holder().is_present());
    response
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    is_listed(HOP_BY_HOP_HEADERS, name)
}

fn is_listed(list: &[&str], name: &str) -> bool {
    list.iter().any(|h| h.eq_ignore_ascii_case(name))
}
