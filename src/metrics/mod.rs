//! Metrics module
//!
//! Prometheus collectors for adaptor operations, transferred bytes, multipart
//! uploads and classified errors. Collectors live in the default registry;
//! [`gather_text`] renders them in the text exposition format.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Encoder,
    Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    pub static ref OPERATIONS_TOTAL: CounterVec = register_counter_vec!(
        "s3_adaptor_operations_total",
        "Total number of adaptor operations",
        &["operation", "status"]
    ).unwrap();

    pub static ref OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "s3_adaptor_operation_duration_seconds",
        "Operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 60.0]
    ).unwrap();

    pub static ref TRANSFER_BYTES: CounterVec = register_counter_vec!(
        "s3_adaptor_transfer_bytes_total",
        "Total bytes transferred",
        &["direction"]  // "upload" or "download"
    ).unwrap();

    // Multipart metrics
    pub static ref MULTIPART_UPLOADS: CounterVec = register_counter_vec!(
        "s3_adaptor_multipart_uploads_total",
        "Total multipart uploads by outcome",
        &["status"]  // "completed", "failed" or "aborted"
    ).unwrap();

    pub static ref MULTIPART_PARTS: Histogram = register_histogram!(
        "s3_adaptor_multipart_parts",
        "Number of parts per completed multipart upload",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 10000.0]
    ).unwrap();

    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "s3_adaptor_errors_total",
        "Total errors by kind",
        &["kind"]
    ).unwrap();
}

/// Record an operation outcome and its duration
pub fn record_operation(operation: &str, success: bool, duration_secs: f64) {
    let status = if success { "success" } else { "failure" };
    OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
    OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Record uploaded bytes
pub fn record_upload_bytes(bytes: u64) {
    TRANSFER_BYTES
        .with_label_values(&["upload"])
        .inc_by(bytes as f64);
}

/// Record downloaded bytes
pub fn record_download_bytes(bytes: u64) {
    TRANSFER_BYTES
        .with_label_values(&["download"])
        .inc_by(bytes as f64);
}

/// Record a completed multipart upload
pub fn record_multipart_completed(parts_count: usize) {
    MULTIPART_UPLOADS.with_label_values(&["completed"]).inc();
    MULTIPART_PARTS.observe(parts_count as f64);
}

/// Record a rejected multipart completion
pub fn record_multipart_failed() {
    MULTIPART_UPLOADS.with_label_values(&["failed"]).inc();
}

/// Record an aborted multipart upload
pub fn record_multipart_aborted() {
    MULTIPART_UPLOADS.with_label_values(&["aborted"]).inc();
}

/// Record an error by kind label
pub fn record_error(kind: &str) {
    ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_operation() {
        record_operation("put_object", true, 0.01);
        record_operation("put_object", false, 0.2);
        // Just verify it doesn't panic
    }

    #[test]
    fn test_record_transfer_bytes() {
        record_upload_bytes(1024);
        record_download_bytes(2048);
        // Just verify it doesn't panic
    }

    #[test]
    fn test_record_multipart_outcomes() {
        record_multipart_completed(3);
        record_multipart_failed();
        record_multipart_aborted();
        // Just verify it doesn't panic
    }

    #[test]
    fn test_gather_text_includes_recorded_metrics() {
        record_error("validation");
        let text = gather_text().unwrap();
        assert!(text.contains("s3_adaptor_errors_total"));
    }
}
