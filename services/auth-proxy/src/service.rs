//! Service lifecycle: runtime counters, startup session, shutdown drain
//!
//! At startup the service either logs in with the configured account or
//! tries to restore a session from the refresh cookie. A backend that cannot
//! be reached yet is retried with exponential backoff; a rejected login is
//! fatal.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::{Duration, Instant};

use auth_client::Session;
use tracing::{info, warn};
use transport::TransportError;

use crate::error::{Error, Result};

/// Drain timeout after a shutdown signal
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum startup login retries before giving up
const MAX_LOGIN_RETRIES: u32 = 5;

/// Runtime counters tracked while the service is running
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    /// Requests currently being processed; reported if the drain times out.
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

/// How the service obtained (or failed to obtain) its session at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupSession {
    LoggedIn,
    Restored,
    Anonymous,
}

impl StartupSession {
    pub fn label(&self) -> &'static str {
        match self {
            StartupSession::LoggedIn => "logged_in",
            StartupSession::Restored => "restored",
            StartupSession::Anonymous => "anonymous",
        }
    }
}

/// Login credentials resolved from config.
pub struct LoginCredentials<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

/// Backoff before retry number `retries` (0-based), or `None` once retries
/// are exhausted. Pure: no I/O.
pub fn login_retry_delay(retries: u32, base: Duration) -> Option<Duration> {
    (retries < MAX_LOGIN_RETRIES).then(|| base * 2u32.pow(retries))
}

/// Only failures to reach the backend are worth retrying at startup.
fn is_retryable(err: &auth_client::Error) -> bool {
    matches!(
        err,
        auth_client::Error::Transport(TransportError::Timeout(_) | TransportError::Connect(_))
    )
}

/// Log in with `credentials`, or restore a session from the refresh cookie
/// when there are none.
pub async fn establish_session(
    session: &Session,
    credentials: Option<LoginCredentials<'_>>,
    retry_base: Duration,
) -> Result<StartupSession> {
    let Some(credentials) = credentials else {
        return Ok(if session.restore().await {
            StartupSession::Restored
        } else {
            StartupSession::Anonymous
        });
    };

    let mut retries = 0;
    loop {
        match session
            .login(credentials.identifier, credentials.password)
            .await
        {
            Ok(user) => {
                info!(user_id = user.id, username = %user.username, "startup login succeeded");
                return Ok(StartupSession::LoggedIn);
            }
            Err(e) if is_retryable(&e) => match login_retry_delay(retries, retry_base) {
                Some(delay) => {
                    warn!(
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "backend unreachable, retrying login"
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                None => {
                    return Err(Error::SessionLogin(format!(
                        "backend unreachable after {MAX_LOGIN_RETRIES} retries: {e}"
                    )));
                }
            },
            Err(e) => return Err(Error::SessionLogin(e.to_string())),
        }
    }
}
