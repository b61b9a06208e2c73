//! Failure classification
//!
//! Decides, for one failed send, whether the failure is passed through, ends
//! the session, or triggers a credential refresh followed by a single retry.
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. Anything other than an HTTP 401 is passed through untouched.
//! 2. A 401 from the refresh endpoint itself ends the session (no refresh
//!    loop on the refresh call).
//! 3. A 401 whose body carries a non-refreshable code (disabled account, bad
//!    login) is passed through; a new credential would not help.
//! 4. A 401 on a request that was already retried ends the session.
//! 5. Any other 401 refreshes the credential and retries once.

use auth_token::{DEFAULT_NON_REFRESHABLE_CODES, ErrorBody, REFRESH_PATH};
use transport::TransportError;

use crate::retry::Attempt;

/// Outcome of classifying one failed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Not an authentication failure; returned to the caller unchanged.
    PassThrough,
    /// The refresh endpoint itself answered 401.
    RefreshEndpointFailure,
    /// 401 with a code that a fresh credential cannot fix.
    NonRefreshable,
    /// 401 after the single permitted retry.
    RetryExhausted,
    /// Expired credential: refresh, then resend once.
    RefreshAndRetry,
}

impl Classification {
    /// Label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Classification::PassThrough => "pass_through",
            Classification::RefreshEndpointFailure => "refresh_endpoint_failure",
            Classification::NonRefreshable => "non_refreshable",
            Classification::RetryExhausted => "retry_exhausted",
            Classification::RefreshAndRetry => "refresh_and_retry",
        }
    }

    /// Whether this outcome discards the current access credential.
    pub fn clears_credential(&self) -> bool {
        matches!(
            self,
            Classification::RefreshEndpointFailure | Classification::RetryExhausted
        )
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    refresh_path: String,
    non_refreshable_codes: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(
            REFRESH_PATH,
            DEFAULT_NON_REFRESHABLE_CODES
                .iter()
                .map(|code| code.to_string())
                .collect(),
        )
    }
}

impl Classifier {
    pub fn new(refresh_path: impl Into<String>, non_refreshable_codes: Vec<String>) -> Self {
        Self {
            refresh_path: refresh_path.into(),
            non_refreshable_codes,
        }
    }

    pub fn refresh_path(&self) -> &str {
        &self.refresh_path
    }

    pub fn non_refreshable_codes(&self) -> &[String] {
        &self.non_refreshable_codes
    }

    /// Whether `path` targets the refresh endpoint.
    ///
    /// Only the path component is compared; query and fragment are ignored.
    /// A relative path must equal the refresh path (leading and trailing
    /// slashes aside). An absolute URL must end with it on a segment
    /// boundary, since its path also carries the API base.
    pub fn is_refresh_endpoint(&self, path: &str) -> bool {
        let target = self.refresh_path.trim_matches('/');
        if target.is_empty() {
            return false;
        }
        let path = path.find(['?', '#']).map_or(path, |end| &path[..end]);
        let absolute = path
            .strip_prefix("https://")
            .or_else(|| path.strip_prefix("http://"));
        match absolute {
            Some(rest) => {
                let url_path = rest.split_once('/').map_or("", |(_, p)| p);
                let url_path = url_path.trim_matches('/');
                url_path == target
                    || url_path
                        .strip_suffix(target)
                        .is_some_and(|base| base.ends_with('/'))
            }
            None => path.trim_matches('/') == target,
        }
    }

    pub fn classify(&self, error: &TransportError, attempt: &Attempt) -> Classification {
        let response = match error.response() {
            Some(response) if response.status == 401 => response,
            _ => return Classification::PassThrough,
        };

        if self.is_refresh_endpoint(&attempt.request().path) {
            return Classification::RefreshEndpointFailure;
        }

        if let Some(body) = ErrorBody::parse(&response.body)
            && self
                .non_refreshable_codes
                .iter()
                .any(|code| body.has_code(code))
        {
            return Classification::NonRefreshable;
        }

        if attempt.is_retried() {
            return Classification::RetryExhausted;
        }

        Classification::RefreshAndRetry
    }
}
