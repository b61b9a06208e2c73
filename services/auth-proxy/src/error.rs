//! Service-specific error types
//!
//! Per-request failures (upstream timeout, refresh failure) are turned into
//! HTTP responses by the handlers and never propagate as Rust errors; these
//! variants cover startup.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Session login failed: {0}")]
    SessionLogin(String),
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
