//! Error types for authenticated client operations

use transport::TransportError;

/// Errors surfaced to callers of `AuthClient` and `Session`.
///
/// Cloneable so one refresh failure can be handed to every request that was
/// waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The request failed and was not (or no longer) eligible for a
    /// credential refresh. Carries the original failure unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A credential refresh was needed and failed. The session is over until
    /// the user authenticates again.
    #[error("credential refresh failed: {0}")]
    Refresh(auth_token::Error),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl Error {
    /// HTTP status of the underlying failed response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Transport(e) => e.status(),
            Error::Refresh(auth_token::Error::Transport(e)) => e.status(),
            _ => None,
        }
    }

    /// Whether the failure means the caller has to authenticate again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::Refresh(_)) || self.status() == Some(401)
    }
}

/// Result alias for authenticated client operations.
pub type Result<T> = std::result::Result<T, Error>;
