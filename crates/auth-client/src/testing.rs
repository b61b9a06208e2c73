//! Scripted in-memory backend for unit tests.
//!
//! Routes by path:
//! - `auth/token/refresh/`: issues the next queued credential (and makes it
//!   the only one protected routes accept) or answers 401 once the queue is
//!   empty. Optionally gated so tests can hold a refresh in flight.
//! - `auth/login/`: password `correct` issues `at_login`, anything else is
//!   401 `INVALID_CREDENTIALS`.
//! - `auth/logout/`: 200, or 500 when `fail_logout` is set.
//! - `missing/`: 404. `disabled/`: 401 `ACCOUNT_DISABLED`. `revoked/`: always
//!   401 `TOKEN_INVALID`. `public/`: 200 without checking the credential.
//! - anything else is protected: 200 echoing the bearer if it matches the
//!   current valid credential, else 401 `TOKEN_INVALID`.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use transport::{ApiRequest, ApiResponse, Transport, TransportError};

pub(crate) const TOKEN_INVALID_BODY: &str = r#"{"success":false,"code":"TOKEN_INVALID","message":"Token is invalid or expired","data":{},"errors":{"_error":["TOKEN_INVALID"]},"meta":{}}"#;

#[derive(Default)]
pub(crate) struct FakeBackend {
    valid: Mutex<Option<String>>,
    issue: Mutex<VecDeque<String>>,
    gate: Option<Semaphore>,
    pub refresh_calls: AtomicUsize,
    pub unauthorized: AtomicUsize,
    pub fail_logout: AtomicBool,
    sent: Mutex<Vec<ApiRequest>>,
}

impl FakeBackend {
    /// Backend accepting `valid` and issuing `issue` (in order) on refresh.
    pub fn new(valid: Option<&str>, issue: &[&str]) -> Self {
        Self {
            valid: Mutex::new(valid.map(str::to_string)),
            issue: Mutex::new(issue.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    /// Same as `new`, but every refresh waits for `release_refresh`.
    pub fn gated(valid: Option<&str>, issue: &[&str]) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(valid, issue)
        }
    }

    pub fn release_refresh(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    /// Stop accepting the current credential (server-side expiry).
    pub fn expire_current(&self) {
        *self.valid.lock().unwrap() = None;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn unauthorized(&self) -> usize {
        self.unauthorized.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<ApiRequest> {
        self.sent.lock().unwrap().clone()
    }

    /// Bearer credentials seen per path, in send order.
    pub fn bearers_by_path(&self) -> HashMap<String, Vec<Option<String>>> {
        let mut map: HashMap<String, Vec<Option<String>>> = HashMap::new();
        for request in self.sent() {
            map.entry(request.path.clone())
                .or_default()
                .push(request.bearer_token().map(str::to_string));
        }
        map
    }

    async fn handle(&self, request: &ApiRequest) -> transport::Result<ApiResponse> {
        self.sent.lock().unwrap().push(request.clone());
        let path = request.path.trim_start_matches('/');

        if path.starts_with("auth/token/refresh/") {
            return self.refresh().await;
        }
        match path {
            "auth/login/" => self.login(request),
            "auth/logout/" => {
                if self.fail_logout.load(Ordering::SeqCst) {
                    fail(500, r#"{"success":false,"code":"INTERNAL_ERROR"}"#)
                } else {
                    ok(r#"{"success":true,"code":"AUTH.LOGOUT_SUCCESS","data":{}}"#.into())
                }
            }
            "missing/" => fail(404, r#"{"success":false,"code":"NOT_FOUND"}"#),
            "disabled/" => fail(
                401,
                r#"{"success":false,"code":"AUTH_FAILED","errors":{"_global":[{"code":"ACCOUNT_DISABLED"}]}}"#,
            ),
            "revoked/" => {
                self.unauthorized.fetch_add(1, Ordering::SeqCst);
                fail(401, TOKEN_INVALID_BODY)
            }
            "public/" => ok(format!(
                r#"{{"success":true,"data":{{"authenticated":{}}}}}"#,
                request.bearer_token().is_some()
            )),
            _ => self.protected(request),
        }
    }

    async fn refresh(&self) -> transport::Result<ApiResponse> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let next = self.issue.lock().unwrap().pop_front();
        match next {
            Some(token) => {
                *self.valid.lock().unwrap() = Some(token.clone());
                ok(format!(
                    r#"{{"success":true,"code":"AUTH.TOKEN_REFRESHED","data":{{"access":"{token}"}}}}"#
                ))
            }
            None => fail(401, r#"{"detail":"No refresh token cookie"}"#),
        }
    }

    fn login(&self, request: &ApiRequest) -> transport::Result<ApiResponse> {
        let body: serde_json::Value =
            serde_json::from_slice(request.body.as_deref().unwrap_or(b"{}")).unwrap();
        if body["password"] == "correct" {
            *self.valid.lock().unwrap() = Some("at_login".into());
            ok(format!(
                r#"{{"success":true,"code":"AUTH.LOGIN_SUCCESS","data":{{"access_token":"at_login","user":{{"id":7,"username":"{}","email":"alice@example.com"}}}}}}"#,
                body["identifier"].as_str().unwrap_or_default()
            ))
        } else {
            fail(
                401,
                r#"{"success":false,"code":"AUTH_FAILED","errors":{"_global":[{"code":"INVALID_CREDENTIALS"}]}}"#,
            )
        }
    }

    fn protected(&self, request: &ApiRequest) -> transport::Result<ApiResponse> {
        let valid = self.valid.lock().unwrap().clone();
        match (request.bearer_token(), valid) {
            (Some(bearer), Some(valid)) if bearer == valid => {
                if request.path.trim_start_matches('/') == "auth/me/" {
                    return ok(
                        r#"{"success":true,"data":{"user":{"id":7,"username":"alice","email":null}}}"#
                            .into(),
                    );
                }
                ok(format!(
                    r#"{{"success":true,"data":{{"path":"{}","token":"{bearer}"}}}}"#,
                    request.path
                ))
            }
            _ => {
                self.unauthorized.fetch_add(1, Ordering::SeqCst);
                fail(401, TOKEN_INVALID_BODY)
            }
        }
    }
}

fn ok(body: String) -> transport::Result<ApiResponse> {
    Ok(ApiResponse::new(200, body))
}

fn fail(status: u16, body: &str) -> transport::Result<ApiResponse> {
    Err(TransportError::Status(ApiResponse::new(
        status,
        body.to_string(),
    )))
}

impl Transport for FakeBackend {
    fn id(&self) -> &str {
        "fake"
    }

    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = transport::Result<ApiResponse>> + Send + 'a>> {
        Box::pin(self.handle(request))
    }
}
