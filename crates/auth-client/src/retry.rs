//! Per-request retry marker
//!
//! Each logical request carries a one-way flag recording whether it has
//! already been retried after a credential refresh. The flag guarantees at
//! most one refresh-and-retry per logical request: a second 401 on the same
//! request is terminal.

use transport::ApiRequest;

/// One logical request and its retry marker.
#[derive(Debug, Clone)]
pub struct Attempt {
    request: ApiRequest,
    retried: bool,
}

impl Attempt {
    pub fn new(request: ApiRequest) -> Self {
        Self {
            request,
            retried: false,
        }
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut ApiRequest {
        &mut self.request
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Set the marker. Returns `false` if it was already set, in which case
    /// the request must not be retried again. The marker is never unset.
    pub fn mark_retried(&mut self) -> bool {
        if self.retried {
            return false;
        }
        self.retried = true;
        true
    }
}
