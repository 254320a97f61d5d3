//! Metrics module
//!
//! Prometheus collectors for upload runs. Rendered on demand with
//! [`gather_text`]; nothing is served over HTTP.

use crate::upload::FailureKind;
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_int_gauge, Counter,
    CounterVec, Encoder, Histogram, IntGauge, TextEncoder,
};

lazy_static! {
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "quota_uploadr_uploads_total",
        "Total number of upload attempts by status",
        &["status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "quota_uploadr_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    pub static ref UPLOAD_FAILURES: CounterVec = register_counter_vec!(
        "quota_uploadr_upload_failures_total",
        "Failed uploads by failure kind",
        &["kind"]
    ).unwrap();

    pub static ref UPLOAD_DURATION: Histogram = register_histogram!(
        "quota_uploadr_upload_duration_seconds",
        "PutObject duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    ).unwrap();

    pub static ref QUOTA_COMMITTED_BYTES: IntGauge = register_int_gauge!(
        "quota_uploadr_quota_committed_bytes",
        "Bytes committed against the bucket ceiling in the current run"
    ).unwrap();
}

/// Record a successful upload
pub fn record_upload_success(bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure(kind: FailureKind) {
    UPLOADS_TOTAL.with_label_values(&["failure"]).inc();
    UPLOAD_FAILURES.with_label_values(&[kind.as_str()]).inc();
}

/// Record transfer duration, successful or not
pub fn record_upload_duration(duration_secs: f64) {
    UPLOAD_DURATION.observe(duration_secs);
}

pub fn set_quota_committed(bytes: u64) {
    QUOTA_COMMITTED_BYTES.set(i64::try_from(bytes).unwrap_or(i64::MAX));
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
