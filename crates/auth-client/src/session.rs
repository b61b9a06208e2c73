//! Session lifecycle on top of `AuthClient`
//!
//! Login and register store the access credential from the response in the
//! holder; logout clears it. `restore` asks the refresh endpoint for a
//! credential at startup, which succeeds when a refresh cookie from an earlier
//! login is still valid.

use std::fmt;
use std::sync::Arc;

use auth_token::{
    AccessToken, LOGIN_PATH, LOGOUT_PATH, ME_PATH, REGISTER_PATH, decode_payload,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use transport::{ApiRequest, ApiResponse};

use crate::client::AuthClient;
use crate::error::{Error, Result};

/// Account returned by login, register and `me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Registration form. Passwords are redacted from Debug output.
#[derive(Clone, Serialize, Deserialize)]
pub struct RegisterPayload {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub password: String,
    pub password_confirm: String,
}

impl fmt::Debug for RegisterPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterPayload")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("password_confirm", &"[REDACTED]")
            .finish()
    }
}

#[derive(Deserialize)]
struct SessionGrant {
    #[serde(alias = "access")]
    access_token: String,
    user: User,
}

/// `me` answers either `{user: {...}}` or the user object itself.
#[derive(Deserialize)]
#[serde(untagged)]
enum MeShape {
    Nested { user: User },
    Flat(User),
}

pub struct Session {
    client: Arc<AuthClient>,
}

impl Session {
    pub fn new(client: Arc<AuthClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<AuthClient> {
        &self.client
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.holder().is_present()
    }

    /// Try to obtain an access credential from the refresh cookie.
    ///
    /// Goes through the refresh coordinator, so a restore racing with request
    /// failures still produces a single refresh call. Returns `false` (holder
    /// cleared) when there is no usable refresh credential.
    pub async fn restore(&self) -> bool {
        match self.client.coordinator().obtain_fresh_credential().await {
            Ok(_) => {
                info!("session restored from refresh credential");
                true
            }
            Err(e) => {
                info!(error = %e, "no session to restore");
                false
            }
        }
    }

    pub async fn login(&self, identifier: &str, password: &str) -> Result<User> {
        let request = ApiRequest::post(LOGIN_PATH).json(&serde_json::json!({
            "identifier": identifier,
            "password": password,
        }))?;
        let response = self.client.send(request).await?;
        let user = self.accept_grant(&response)?;
        info!(user_id = user.id, "logged in");
        Ok(user)
    }

    pub async fn register(&self, payload: &RegisterPayload) -> Result<User> {
        let request = ApiRequest::post(REGISTER_PATH).json(payload)?;
        let response = self.client.send(request).await?;
        let user = self.accept_grant(&response)?;
        info!(user_id = user.id, "registered and logged in");
        Ok(user)
    }

    /// Log out on the server and clear the local credential. The credential
    /// is cleared even when the server call fails; the failure is still
    /// reported.
    pub async fn logout(&self) -> Result<()> {
        let result = self.client.send(ApiRequest::post(LOGOUT_PATH)).await;
        self.client.holder().set(None);
        match result {
            Ok(_) => {
                info!("logged out");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "logout request failed, local credential cleared anyway");
                Err(e)
            }
        }
    }

    /// Current user, as seen by the backend.
    pub async fn me(&self) -> Result<User> {
        let response = self.client.send(ApiRequest::get(ME_PATH)).await?;
        let shape: MeShape =
            decode_payload(&response.body).map_err(|e| Error::Decode(e.to_string()))?;
        Ok(match shape {
            MeShape::Nested { user } | MeShape::Flat(user) => user,
        })
    }

    fn accept_grant(&self, response: &ApiResponse) -> Result<User> {
        let grant: SessionGrant = decode_payload(&response.body)
            .map_err(|e| Error::Decode(format!("session grant: {e}")))?;
        if grant.access_token.trim().is_empty() {
            return Err(Error::Decode("session grant: empty access credential".into()));
        }
        self.client
            .holder()
            .set(Some(AccessToken::new(grant.access_token)));
        Ok(grant.user)
    }
}
