//! Credential lifecycle metrics
//!
//! - `auth_refresh_total` (counter): label `outcome` (`success` | `failure`)
//! - `auth_refresh_joined_total` (counter): requests that waited on a refresh
//!   another request had already started
//! - `auth_retry_total` (counter): requests re-sent with a refreshed credential
//! - `auth_classified_total` (counter): label `outcome`, one per failed send
//!
//! Calls are no-ops until the embedding binary installs a recorder.

use crate::classify::Classification;

pub fn record_refresh(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("auth_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_refresh_joined() {
    metrics::counter!("auth_refresh_joined_total").increment(1);
}

pub fn record_retry() {
    metrics::counter!("auth_retry_total").increment(1);
}

pub fn record_classification(classification: Classification) {
    metrics::counter!("auth_classified_total", "outcome" => classification.label()).increment(1);
}
