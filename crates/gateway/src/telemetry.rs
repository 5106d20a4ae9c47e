//! Refresh protocol metrics
//!
//! Emitted through the `metrics` facade; the host decides whether a recorder
//! is installed. Without one every call is a no-op.
//!
//! - `gateway_refresh_total` (counter): label `outcome` = success | failure | abandoned
//! - `gateway_requests_queued_total` (counter): requests parked behind an in-flight refresh
//! - `gateway_queue_timeouts_total` (counter): queued requests that gave up waiting
//! - `gateway_session_expired_total` (counter): label `reason`

pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("gateway_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_queued() {
    metrics::counter!("gateway_requests_queued_total").increment(1);
}

pub fn record_queue_timeout() {
    metrics::counter!("gateway_queue_timeouts_total").increment(1);
}

pub fn record_session_expired(reason: &'static str) {
    metrics::counter!("gateway_session_expired_total", "reason" => reason).increment(1);
}
