//! Authenticated request orchestration
//!
//! `AuthClient::send` decorates a request with the current credential, sends
//! it, and on failure classifies the outcome. An expired credential triggers
//! a (shared) refresh and a single resend with the new credential; every
//! other failure is returned to the caller unchanged.

use std::sync::Arc;

use auth_token::{AccessToken, CredentialHolder};
use reqwest::header::AUTHORIZATION;
use tracing::{debug, instrument, warn};
use transport::{ApiRequest, ApiResponse, Transport};

use crate::classify::{Classification, Classifier};
use crate::error::{Error, Result};
use crate::metrics;
use crate::refresh::RefreshCoordinator;
use crate::retry::Attempt;

/// Attach `credential` as a bearer Authorization header, or strip any
/// Authorization header when there is none. Everything else on the request
/// is left untouched.
pub fn decorate(request: &mut ApiRequest, credential: Option<&AccessToken>) {
    match credential.and_then(AccessToken::header_value) {
        Some(value) => {
            request.headers.insert(AUTHORIZATION, value);
        }
        None => {
            request.headers.remove(AUTHORIZATION);
        }
    }
}

pub struct AuthClient {
    transport: Arc<dyn Transport>,
    holder: Arc<CredentialHolder>,
    classifier: Classifier,
    coordinator: RefreshCoordinator,
}

impl AuthClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        holder: Arc<CredentialHolder>,
        classifier: Classifier,
    ) -> Self {
        let coordinator =
            RefreshCoordinator::new(transport.clone(), holder.clone(), classifier.refresh_path());
        Self {
            transport,
            holder,
            classifier,
            coordinator,
        }
    }

    pub fn holder(&self) -> &Arc<CredentialHolder> {
        &self.holder
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Send a request with the current credential, refreshing and retrying
    /// once if the backend reports the credential as expired.
    ///
    /// Errors:
    /// - `Error::Transport`: the original failure (non-401, non-refreshable
    ///   401, or the 401 that ended the session)
    /// - `Error::Refresh`: the request needed a new credential and the
    ///   refresh failed
    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut attempt = Attempt::new(request);
        let mut credential = self.holder.get();

        loop {
            decorate(attempt.request_mut(), credential.as_ref());

            let error = match self.transport.send(attempt.request()).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            let classification = self.classifier.classify(&error, &attempt);
            metrics::record_classification(classification);

            if classification.clears_credential() {
                self.end_session(classification, credential.as_ref());
                return Err(Error::Transport(error));
            }

            match classification {
                Classification::RefreshAndRetry => {
                    if !attempt.mark_retried() {
                        self.end_session(Classification::RetryExhausted, credential.as_ref());
                        return Err(Error::Transport(error));
                    }
                    debug!("access credential rejected, refreshing");
                    let fresh = self
                        .coordinator
                        .obtain_fresh_credential()
                        .await
                        .map_err(Error::Refresh)?;
                    metrics::record_retry();
                    credential = Some(fresh);
                }
                Classification::NonRefreshable => {
                    debug!(status = ?error.status(), "non-refreshable authentication failure");
                    return Err(Error::Transport(error));
                }
                _ => return Err(Error::Transport(error)),
            }
        }
    }

    /// Drop the credential the failed attempt carried. A credential installed
    /// since then (by a concurrent refresh or login) is kept.
    fn end_session(&self, classification: Classification, sent: Option<&AccessToken>) {
        let cleared = sent.is_some_and(|sent| self.holder.clear_if_current(sent));
        warn!(
            outcome = classification.label(),
            cleared, "authentication failed, session ended"
        );
    }
}
