//! Access credential and the refresh endpoint call
//!
//! The access credential is an opaque, short-lived bearer string. It is never
//! decoded locally: staleness is discovered only when the backend rejects it.
//!
//! The refresh endpoint answers with the new credential either wrapped in the
//! response envelope (`data.access`) or bare (`access`); login and register use
//! `access_token`. All three shapes are accepted.

use std::fmt;

use reqwest::header::HeaderValue;
use serde::Deserialize;
use tracing::{debug, warn};
use transport::{ApiRequest, Transport, TransportError};
use zeroize::Zeroize;

use crate::envelope::decode_payload;
use crate::error::{Error, Result};

/// Opaque bearer credential - redacted in Debug/Display/logs, zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the raw credential (use sparingly)
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// `Bearer <credential>` header value, marked sensitive so it is never
    /// printed by http debug output. `None` if the credential contains bytes
    /// that are not valid in a header.
    pub fn header_value(&self) -> Option<HeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0)).ok()?;
        value.set_sensitive(true);
        Some(value)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken([REDACTED])")
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Drop for AccessToken {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[derive(Deserialize)]
struct AccessGrant {
    #[serde(alias = "access_token")]
    access: String,
}

/// Extract the access credential from a login/register/refresh response body.
pub fn parse_access_grant(body: &[u8]) -> Result<AccessToken> {
    let grant: AccessGrant = decode_payload(body)
        .map_err(|e| Error::TokenParse(format!("no access credential in response: {e}")))?;
    if grant.access.trim().is_empty() {
        return Err(Error::TokenParse("access credential is empty".into()));
    }
    Ok(AccessToken::new(grant.access))
}

/// Call the refresh endpoint and return the new access credential.
///
/// Sent without a body and without a bearer credential: the backend
/// authenticates the call from the refresh cookie. 401/403 means the refresh
/// credential is missing, expired or blacklisted.
pub async fn refresh_access_token(transport: &dyn Transport, path: &str) -> Result<AccessToken> {
    let request = ApiRequest::post(path);
    let response = match transport.send(&request).await {
        Ok(response) => response,
        Err(TransportError::Status(response)) if matches!(response.status, 401 | 403) => {
            warn!(status = response.status, "refresh credential rejected");
            return Err(Error::InvalidCredentials(format!(
                "refresh endpoint returned {}: {}",
                response.status,
                response.text()
            )));
        }
        Err(e) => {
            warn!(error = %e, "refresh request failed");
            return Err(Error::Transport(e));
        }
    };

    let token = parse_access_grant(&response.body)?;
    debug!(transport = transport.id(), "refresh endpoint issued a new access credential");
    Ok(token)
}
