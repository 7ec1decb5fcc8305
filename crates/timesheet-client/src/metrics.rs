//! Client-side request metrics
//!
//! - `timesheet_client_requests_total` (counter): labels `method`, `status`
//! - `timesheet_client_request_duration_seconds` (histogram): label `status`
//! - `timesheet_client_retries_total` (counter): label `status`
//!
//! Transport failures carry `status="error"`. With no recorder installed
//! every call is a no-op.

/// Record one HTTP attempt. `status` is `None` when no response arrived.
pub fn record_request(method: &str, status: Option<u16>, duration_secs: f64) {
    let status = status_label(status);
    metrics::counter!(
        "timesheet_client_requests_total",
        "method" => method.to_string(),
        "status" => status.clone()
    )
    .increment(1);
    metrics::histogram!("timesheet_client_request_duration_seconds", "status" => status)
        .record(duration_secs);
}

/// Record a retry scheduled after `status`.
pub fn record_retry(status: u16) {
    metrics::counter!("timesheet_client_retries_total", "status" => status.to_string())
        .increment(1);
}

fn status_label(status: Option<u16>) -> String {
    status.map_or_else(|| "error".to_string(), |s| s.to_string())
}
