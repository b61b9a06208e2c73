//! Single-flight credential refresh
//!
//! When several in-flight requests discover an expired credential at the same
//! time, exactly one refresh call goes to the backend; every other request
//! waits on that call and receives its outcome.
//!
//! The pending refresh lives in a slot guarded by a non-async mutex: checking
//! for a pending refresh and installing a new one happen under one lock, with
//! no await in between. The refresh itself runs in a spawned task, so it
//! completes (and the holder is updated) even if every waiter is cancelled.
//! The task empties the slot after updating the holder and before any waiter
//! observes the result, so the next, independent expiry starts a new refresh.

use std::sync::Arc;

use auth_token::{AccessToken, CredentialHolder, refresh_access_token};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use transport::Transport;

use crate::metrics;

type SharedRefresh = Shared<BoxFuture<'static, auth_token::Result<AccessToken>>>;
type PendingSlot = Arc<Mutex<Option<SharedRefresh>>>;

pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    holder: Arc<CredentialHolder>,
    refresh_path: String,
    pending: PendingSlot,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        holder: Arc<CredentialHolder>,
        refresh_path: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            holder,
            refresh_path: refresh_path.into(),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether a refresh is currently in flight.
    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Obtain a fresh access credential, joining the in-flight refresh if
    /// there is one and starting one otherwise.
    ///
    /// On success the holder already contains the returned credential. On
    /// failure the holder has been cleared and every waiter gets the same
    /// error.
    pub async fn obtain_fresh_credential(&self) -> auth_token::Result<AccessToken> {
        let refresh = {
            let mut pending = self.pending.lock();
            match pending.as_ref() {
                Some(in_flight) => {
                    debug!("joining in-flight credential refresh");
                    metrics::record_refresh_joined();
                    in_flight.clone()
                }
                None => {
                    let started = self.start();
                    *pending = Some(started.clone());
                    started
                }
            }
        };
        refresh.await
    }

    fn start(&self) -> SharedRefresh {
        let transport = self.transport.clone();
        let holder = self.holder.clone();
        let path = self.refresh_path.clone();
        let reset = ResetOnDrop(self.pending.clone());

        info!("starting credential refresh");
        let task = tokio::spawn(async move {
            let _reset = reset;
            let mut unsettled = ClearUnlessSettled(Some(holder.clone()));
            let result = refresh_access_token(transport.as_ref(), &path).await;
            unsettled.0 = None;
            match &result {
                Ok(token) => {
                    holder.set(Some(token.clone()));
                    metrics::record_refresh(true);
                    info!("credential refresh succeeded");
                }
                Err(e) => {
                    holder.set(None);
                    metrics::record_refresh(false);
                    warn!(error = %e, "credential refresh failed, access credential cleared");
                }
            }
            result
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(auth_token::Error::Aborted(e.to_string())))
        }
        .boxed()
        .shared()
    }
}

/// Empties the pending slot when the refresh task finishes, including when
/// it panics or is aborted with the runtime.
struct ResetOnDrop(PendingSlot);

impl Drop for ResetOnDrop {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

/// Clears the holder if the refresh task unwinds or is dropped before the
/// refresh call returns. The task binds it after `ResetOnDrop`, so it drops
/// first and no new refresh can start before the holder is cleared.
struct ClearUnlessSettled(Option<Arc<CredentialHolder>>);

impl Drop for ClearUnlessSettled {
    fn drop(&mut self) {
        if let Some(holder) = self.0.take() {
            warn!("credential refresh did not complete, access credential cleared");
            holder.set(None);
        }
    }
}
