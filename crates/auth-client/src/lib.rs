//! Authenticated API client with coordinated credential refresh
//!
//! Wraps a `Transport` so that every request carries the current access
//! credential and an expired credential is recovered transparently:
//!
//! 1. `AuthClient::send` decorates the request from the `CredentialHolder`
//! 2. On failure, `Classifier` decides: pass through, end the session, or
//!    refresh and retry
//! 3. `RefreshCoordinator` runs at most one refresh call at a time; every
//!    request that needs a new credential while it runs waits on it
//! 4. The request is resent once with the new credential (`Attempt` marker)
//!
//! `Session` adds login, register, logout, `me` and startup restore.

pub mod classify;
pub mod client;
pub mod error;
pub mod metrics;
pub mod refresh;
pub mod retry;
pub mod session;

#[cfg(test)]
mod testing;

pub use classify::{Classification, Classifier};
pub use client::{AuthClient, decorate};
pub use error::{Error, Result};
pub use refresh::RefreshCoordinator;
pub use retry::Attempt;
pub use session::{RegisterPayload, Session, User};
