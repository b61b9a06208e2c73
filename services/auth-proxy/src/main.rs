//! Authenticated API proxy
//!
//! Single-binary service that holds one backend session and lets local
//! callers use it:
//! 1. Logs in with the configured account, or restores a session from the
//!    refresh cookie
//! 2. Forwards every other request to the backend with the access credential
//!    attached
//! 3. Refreshes an expired credential once, however many requests notice the
//!    expiry at the same time, and retries the rejected requests

mod config;
mod error;
mod metrics;
mod proxy;
mod service;
mod session_api;
#[cfg(test)]
mod test_backend;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use auth_client::{AuthClient, Classifier, Session};
use auth_token::CredentialHolder;
use axum::Router;
use axum::extract::{FromRef, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::ReqwestTransport;

use crate::config::Config;
use crate::proxy::ProxyState;
use crate::service::{DRAIN_TIMEOUT, LoginCredentials, ServiceMetrics, establish_session};
use crate::session_api::SessionState;

/// Base delay between startup login attempts while the backend is unreachable
const LOGIN_RETRY_BASE: Duration = Duration::from_secs(1);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    proxy: ProxyState,
    session: SessionState,
    metrics: ServiceMetrics,
    prometheus: PrometheusHandle,
}

impl FromRef<AppState> for SessionState {
    fn from_ref(state: &AppState) -> Self {
        state.session.clone()
    }
}

/// Build the axum router with all routes and shared state.
///
/// `max_connections` caps concurrently processed requests.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(session_api::routes())
        .fallback(proxy_handler)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Wire the client stack and counters into handler state.
fn app_state(client: Arc<AuthClient>, prometheus: PrometheusHandle) -> AppState {
    let metrics = ServiceMetrics::new();
    AppState {
        proxy: ProxyState {
            client: client.clone(),
            requests_total: metrics.requests_total.clone(),
            errors_total: metrics.errors_total.clone(),
            in_flight: metrics.in_flight.clone(),
        },
        session: SessionState {
            session: Arc::new(Session::new(client)),
        },
        metrics,
        prometheus,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs; LOG_LEVEL wins over RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting auth-proxy");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install metrics recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.proxy.listen_addr,
        base_url = %config.api.base_url,
        refresh_path = %config.api.refresh_path,
        headers = config.headers.len(),
        session_account = config.session.is_some(),
        "configuration loaded"
    );

    let transport = ReqwestTransport::new(
        &config.api.base_url,
        Duration::from_secs(config.api.timeout_secs),
        config.headers.clone(),
    )
    .context("failed to build backend transport")?;
    let classifier = Classifier::new(
        &config.api.refresh_path,
        config.api.non_refreshable_codes.clone(),
    );
    let client = Arc::new(AuthClient::new(
        Arc::new(transport),
        Arc::new(CredentialHolder::new()),
        classifier,
    ));

    let app_state = app_state(client, prometheus_handle);

    let credentials = match &config.session {
        Some(session) => match &session.password {
            Some(password) => Some(LoginCredentials {
                identifier: &session.identifier,
                password: password.as_str(),
            }),
            None => {
                warn!(
                    identifier = %session.identifier,
                    "no password configured for session account, trying to restore a session instead"
                );
                None
            }
        },
        None => None,
    };

    let startup = establish_session(&app_state.session.session, credentials, LOGIN_RETRY_BASE)
        .await
        .context("failed to establish backend session")?;
    metrics::set_session_authenticated(app_state.session.session.is_authenticated());
    info!(session = startup.label(), "startup session established");

    let in_flight = app_state.metrics.in_flight.clone();
    let listen_addr = config.proxy.listen_addr;
    let app = build_router(app_state, config.proxy.max_connections);

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timer starts when the signal arrives: the server is told to
    // drain, then the drain races DRAIN_TIMEOUT.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    metrics::set_session_authenticated(false);
    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: liveness plus session state. Always 200; an anonymous
/// session still proxies public endpoints.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "authenticated": state.session.session.is_authenticated(),
        "refresh_in_progress": state.proxy.client.coordinator().is_pending(),
        "uptime_seconds": state.metrics.started_at.elapsed().as_secs(),
        "requests_served": state.metrics.requests_total.load(Ordering::Relaxed),
        "errors_total": state.metrics.errors_total.load(Ordering::Relaxed),
        "in_flight": state.metrics.in_flight.load(Ordering::Relaxed),
    });

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Catch-all handler that forwards everything else to the backend.
async fn proxy_handler(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> Response {
    proxy::proxy_request(&state.proxy, request, proxy::new_request_id()).await
}

/// Wait for SIGTERM or SIGINT. A signal source that cannot be installed is
/// logged and ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
