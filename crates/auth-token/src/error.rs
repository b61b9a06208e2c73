//! Error types for credential operations

use transport::TransportError;

/// Errors from credential refresh and token parsing.
///
/// Cloneable: one refresh outcome is handed to every request waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("refresh request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("refresh credential rejected: {0}")]
    InvalidCredentials(String),

    #[error("token response parse error: {0}")]
    TokenParse(String),

    #[error("refresh aborted: {0}")]
    Aborted(String),
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;
