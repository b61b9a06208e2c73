//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The session password is loaded from the AUTH_PASSWORD env var or
//! `password_file`, never stored in the TOML directly.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use auth_token::{DEFAULT_BASE_URL, DEFAULT_NON_REFRESHABLE_CODES, REFRESH_PATH};
use serde::Deserialize;
use transport::HeaderInjection;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub session: Option<SessionConfig>,
    #[serde(default)]
    pub headers: Vec<HeaderInjection>,
}

/// Backend API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    /// 401 error codes that a refreshed credential cannot fix
    #[serde(default = "default_non_refreshable_codes")]
    pub non_refreshable_codes: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            refresh_path: default_refresh_path(),
            non_refreshable_codes: default_non_refreshable_codes(),
        }
    }
}

/// Local listener settings
#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Account to log in with at startup. Without it the service only tries to
/// restore a session from the refresh cookie.
#[derive(Deserialize)]
pub struct SessionConfig {
    pub identifier: String,
    /// Path to a file containing the password (alternative to AUTH_PASSWORD)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
    #[serde(skip)]
    pub password: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("identifier", &self.identifier)
            .field("password_file", &self.password_file)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_refresh_path() -> String {
    REFRESH_PATH.to_string()
}

fn default_non_refreshable_codes() -> Vec<String> {
    DEFAULT_NON_REFRESHABLE_CODES
        .iter()
        .map(|code| code.to_string())
        .collect()
}

fn default_max_connections() -> usize {
    1000
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Password resolution order (only when `[session]` is present):
    /// 1. AUTH_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Some(session) = config.session.as_mut() {
            session.password = resolve_password(session.password_file.as_deref())?;
        }

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than 0".into()));
        }

        if self.api.refresh_path.trim_matches('/').is_empty() {
            return Err(Error::Config("refresh_path must not be empty".into()));
        }

        if self.proxy.max_connections == 0 {
            return Err(Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if let Some(session) = &self.session
            && session.identifier.trim().is_empty()
        {
            return Err(Error::Config("session identifier must not be empty".into()));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("auth-proxy.toml")
    }
}

fn resolve_password(password_file: Option<&Path>) -> Result<Option<Zeroizing<String>>> {
    if let Ok(password) = std::env::var("AUTH_PASSWORD") {
        return Ok(Some(Zeroizing::new(password)));
    }
    let Some(file) = password_file else {
        return Ok(None);
    };
    let contents = Zeroizing::new(std::fs::read_to_string(file).map_err(|e| {
        Error::Config(format!(
            "failed to read password_file {}: {e}",
            file.display()
        ))
    })?);
    let password = contents.trim();
    if password.is_empty() {
        return Ok(None);
    }
    Ok(Some(Zeroizing::new(password.to_owned())))
}
