//! Access credential primitives for the authenticated API client
//!
//! Provides the opaque bearer credential type, the process-wide credential
//! holder, the backend response envelope, and the refresh endpoint call. This
//! crate has no notion of retries or concurrency; the single-flight refresh
//! coordination lives in `auth-client`.
//!
//! Credential lifecycle:
//! 1. Login/register responses carry an access credential → `CredentialHolder::set`
//! 2. Every outgoing request reads `CredentialHolder::get`
//! 3. On expiry the client calls `token::refresh_access_token()` (the refresh
//!    credential travels out-of-band as an HttpOnly cookie)
//! 4. Logout or refresh failure → `CredentialHolder::set(None)`

pub mod constants;
pub mod envelope;
pub mod error;
pub mod holder;
pub mod token;

pub use constants::*;
pub use envelope::{ErrorBody, decode_payload};
pub use error::{Error, Result};
pub use holder::CredentialHolder;
pub use token::{AccessToken, parse_access_grant, refresh_access_token};
