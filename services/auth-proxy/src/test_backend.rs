//! In-process mock of the backend API for service tests.
//!
//! Serves `/api/v1/` on 127.0.0.1:0:
//! - `auth/login/`: password `correct` issues `at_1` and sets the
//!   `refresh_token` HttpOnly cookie; anything else is 401 `AUTH_FAILED`
//! - `auth/register/`: issues `at_reg` and the cookie
//! - `auth/token/refresh/`: requires the cookie; issues `at_<n+1>`
//! - `auth/logout/`: clears the cookie
//! - `slow/`: sleeps past test timeouts
//! - everything else: protected, echoes method/path/query/headers/body when
//!   the bearer matches the current credential, else 401 `TOKEN_INVALID`

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use auth_client::{AuthClient, Classifier, Session};
use auth_token::CredentialHolder;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;
use transport::ReqwestTransport;

const TOKEN_INVALID: &str = r#"{"success":false,"code":"TOKEN_INVALID","message":"Token is invalid or expired","data":{},"errors":{"_error":["TOKEN_INVALID"]},"meta":{}}"#;

#[derive(Default)]
struct MockState {
    valid: Mutex<Option<String>>,
    issued: AtomicUsize,
    refresh_calls: AtomicUsize,
    unauthorized: AtomicUsize,
    /// Hold refresh answers until this many 401s have been served.
    hold_refresh_until: AtomicUsize,
    refresh_revoked: AtomicBool,
}

pub struct MockBackend {
    pub base_url: String,
    state: Arc<MockState>,
    _server: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState::default());

        let app = axum::Router::new()
            .fallback(handle)
            .with_state(state.clone());
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/api/v1/"),
            state,
            _server: server,
        }
    }

    /// Session over a fresh cookie-enabled transport and empty holder.
    pub fn session(&self) -> Arc<Session> {
        Arc::new(Session::new(self.client(Duration::from_secs(5))))
    }

    pub fn client(&self, timeout: Duration) -> Arc<AuthClient> {
        let transport = ReqwestTransport::new(&self.base_url, timeout, vec![]).unwrap();
        Arc::new(AuthClient::new(
            Arc::new(transport),
            Arc::new(CredentialHolder::new()),
            Classifier::default(),
        ))
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    /// Server-side expiry of the current access credential.
    pub fn expire_access(&self) {
        *self.state.valid.lock().unwrap() = None;
    }

    /// Reject every further refresh (blacklisted refresh credential).
    pub fn revoke_refresh(&self) {
        self.state.refresh_revoked.store(true, Ordering::SeqCst);
    }

    pub fn hold_refresh_until(&self, unauthorized: usize) {
        self.state
            .hold_refresh_until
            .store(unauthorized, Ordering::SeqCst);
    }
}

fn json(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn with_refresh_cookie(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::SET_COOKIE,
        "refresh_token=rt_1; HttpOnly; Path=/".parse().unwrap(),
    );
    response
}

fn grant(access: &str, id: u64, username: &str) -> Response {
    with_refresh_cookie(json(
        StatusCode::OK,
        serde_json::json!({
            "success": true,
            "code": "AUTH.LOGIN_SUCCESS",
            "data": {
                "access_token": access,
                "user": {"id": id, "username": username, "email": null},
            },
        })
        .to_string(),
    ))
}

async fn handle(State(state): State<Arc<MockState>>, request: Request<Body>) -> Response {
    let path = request.uri().path().trim_start_matches("/api/v1/").to_string();
    let query = request.uri().query().unwrap_or("").to_string();
    let method = request.method().to_string();
    let headers = request.headers().clone();
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let has_cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("refresh_token=rt_1"));
    let body = axum::body::to_bytes(request.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let body_json: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();

    match path.as_str() {
        "auth/login/" => {
            if body_json["password"] == "correct" {
                *state.valid.lock().unwrap() = Some("at_1".into());
                grant("at_1", 1, body_json["identifier"].as_str().unwrap_or_default())
            } else {
                json(
                    StatusCode::UNAUTHORIZED,
                    r#"{"success":false,"code":"AUTH_FAILED","errors":{"_global":[{"code":"INVALID_CREDENTIALS"}]}}"#.into(),
                )
            }
        }
        "auth/register/" => {
            *state.valid.lock().unwrap() = Some("at_reg".into());
            grant("at_reg", 2, body_json["username"].as_str().unwrap_or_default())
        }
        "auth/token/refresh/" => {
            if !has_cookie || state.refresh_revoked.load(Ordering::SeqCst) {
                return json(
                    StatusCode::UNAUTHORIZED,
                    r#"{"detail":"No refresh token cookie"}"#.into(),
                );
            }
            state.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let hold = state.hold_refresh_until.load(Ordering::SeqCst);
            let waited = tokio::time::timeout(Duration::from_secs(5), async {
                while state.unauthorized.load(Ordering::SeqCst) < hold {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await;
            assert!(waited.is_ok(), "refresh hold never released");
            if hold > 0 {
                // Let every rejected request reach the refresh coordinator.
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            let n = state.issued.fetch_add(1, Ordering::SeqCst) + 2;
            let token = format!("at_{n}");
            *state.valid.lock().unwrap() = Some(token.clone());
            with_refresh_cookie(json(
                StatusCode::OK,
                serde_json::json!({
                    "success": true,
                    "code": "AUTH.TOKEN_REFRESHED",
                    "data": {"access": token},
                })
                .to_string(),
            ))
        }
        "auth/logout/" => {
            let mut response = json(StatusCode::OK, r#"{"success":true,"data":{}}"#.into());
            response.headers_mut().insert(
                header::SET_COOKIE,
                "refresh_token=; Max-Age=0; Path=/".parse().unwrap(),
            );
            response
        }
        _ => {
            if path == "slow/" {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            let valid = state.valid.lock().unwrap().clone();
            if bearer.is_none() || bearer != valid {
                state.unauthorized.fetch_add(1, Ordering::SeqCst);
                return json(StatusCode::UNAUTHORIZED, TOKEN_INVALID.into());
            }
            if path == "auth/me/" {
                return json(
                    StatusCode::OK,
                    r#"{"success":true,"data":{"user":{"id":1,"username":"alice","email":"alice@example.com"}}}"#
                        .into(),
                );
            }
            if path == "missing/" {
                return json(
                    StatusCode::NOT_FOUND,
                    r#"{"success":false,"code":"NOT_FOUND"}"#.into(),
                );
            }
            let mut echoed = serde_json::Map::new();
            for (name, value) in &headers {
                echoed.insert(
                    name.to_string(),
                    serde_json::Value::String(value.to_str().unwrap_or("").to_string()),
                );
            }
            let mut response = json(
                StatusCode::OK,
                serde_json::json!({
                    "method": method,
                    "path": path,
                    "query": query,
                    "token": bearer,
                    "echoed_headers": echoed,
                    "body": String::from_utf8_lossy(&body),
                })
                .to_string(),
            );
            response
                .headers_mut()
                .insert("x-backend-echo", "true".parse().unwrap());
            response
        }
    }
}
