//! Backend API constants
//!
//! Paths are relative to the API base URL. The refresh endpoint is
//! authenticated by the `refresh_token` HttpOnly cookie, never by the bearer
//! credential.

/// Default API base URL of the backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1/";

/// Token refresh endpoint (POST, no body)
pub const REFRESH_PATH: &str = "auth/token/refresh/";

pub const LOGIN_PATH: &str = "auth/login/";
pub const LOGOUT_PATH: &str = "auth/logout/";
pub const REGISTER_PATH: &str = "auth/register/";
pub const ME_PATH: &str = "auth/me/";

/// Authorization failures that a refreshed credential cannot fix.
pub const DEFAULT_NON_REFRESHABLE_CODES: &[&str] = &["ACCOUNT_DISABLED", "INVALID_CREDENTIALS"];
