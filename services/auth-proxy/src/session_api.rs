//! Session API
//!
//! Lets local callers drive the service's session; the credential itself is
//! never returned.
//!
//! Endpoints:
//! - GET  /session: `{"authenticated": bool, "user": {...}}`
//! - POST /session/login: `{identifier, password}`
//! - POST /session/register: `{username, email?, password, password_confirm}`
//! - POST /session/logout: clears the credential even if the backend call fails

use std::sync::Arc;

use auth_client::{RegisterPayload, Session, User};
use axum::Router;
use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tracing::info;

use crate::metrics;
use crate::proxy::{client_error_response, new_request_id};

/// Shared state for session handlers.
#[derive(Clone)]
pub struct SessionState {
    pub session: Arc<Session>,
}

/// Session routes, mountable on any router whose state provides a
/// `SessionState`.
pub fn routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    SessionState: FromRef<S>,
{
    Router::new()
        .route("/session", get(session_status))
        .route("/session/login", post(login))
        .route("/session/register", post(register))
        .route("/session/logout", post(logout))
}

#[derive(Deserialize)]
struct LoginRequest {
    identifier: String,
    password: String,
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn authenticated(user: &User) -> Response {
    json_response(
        StatusCode::OK,
        serde_json::json!({ "authenticated": true, "user": user }),
    )
}

fn anonymous() -> Response {
    json_response(StatusCode::OK, serde_json::json!({ "authenticated": false }))
}

fn user_result(state: &SessionState, result: auth_client::Result<User>) -> Response {
    metrics::set_session_authenticated(state.session.is_authenticated());
    match result {
        Ok(user) => authenticated(&user),
        Err(e) => client_error_response(&e, &new_request_id()),
    }
}

/// GET /session: current session state. Asks the backend who we are, which
/// refreshes the credential if it has expired.
async fn session_status(State(state): State<SessionState>) -> Response {
    if !state.session.is_authenticated() {
        return anonymous();
    }
    let result = state.session.me().await;
    metrics::set_session_authenticated(state.session.is_authenticated());
    match result {
        Ok(user) => authenticated(&user),
        Err(e) if e.is_session_expired() => anonymous(),
        Err(e) => client_error_response(&e, &new_request_id()),
    }
}

/// POST /session/login
async fn login(
    State(state): State<SessionState>,
    axum::Json(body): axum::Json<LoginRequest>,
) -> Response {
    info!(identifier = %body.identifier, "session login requested");
    let result = state.session.login(&body.identifier, &body.password).await;
    user_result(&state, result)
}

/// POST /session/register
async fn register(
    State(state): State<SessionState>,
    axum::Json(body): axum::Json<RegisterPayload>,
) -> Response {
    info!(username = %body.username, "session registration requested");
    let result = state.session.register(&body).await;
    user_result(&state, result)
}

/// POST /session/logout
async fn logout(State(state): State<SessionState>) -> Response {
    let result = state.session.logout().await;
    metrics::set_session_authenticated(false);
    match result {
        Ok(()) => anonymous(),
        Err(e) => client_error_response(&e, &new_request_id()),
    }
}
