//! Process-wide access credential holder
//!
//! A single slot holding the current access credential, or none. Created empty
//! at startup, shared via `Arc`, and mutated only through `set`. Reads and
//! writes never suspend, so a caller can check and act on the credential
//! without yielding to other tasks in between.
//!
//! There is no local expiry tracking: a stale credential is discovered when
//! the backend rejects a request carrying it.

use parking_lot::RwLock;
use tracing::debug;

use crate::token::AccessToken;

#[derive(Debug, Default)]
pub struct CredentialHolder {
    current: RwLock<Option<AccessToken>>,
}

impl CredentialHolder {
    /// Empty holder (no credential).
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the current credential.
    pub fn get(&self) -> Option<AccessToken> {
        self.current.read().clone()
    }

    /// Replace the current credential; `None` clears it.
    pub fn set(&self, credential: Option<AccessToken>) {
        let mut current = self.current.write();
        match (&*current, &credential) {
            (_, Some(_)) => debug!("access credential stored"),
            (Some(_), None) => debug!("access credential cleared"),
            (None, None) => {}
        }
        *current = credential;
    }

    /// Clear the slot only if it still holds `expected`. Returns whether it
    /// was cleared.
    pub fn clear_if_current(&self, expected: &AccessToken) -> bool {
        let mut current = self.current.write();
        if current.as_ref() != Some(expected) {
            return false;
        }
        *current = None;
        debug!("access credential cleared");
        true
    }

    pub fn is_present(&self) -> bool {
        self.current.read().is_some()
    }
}
