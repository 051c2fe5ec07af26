//! Analysis metrics.
//!
//! Recorded through the `metrics` facade; the Prometheus recorder installed
//! by `service_core::observability::init_metrics` exports them on /metrics.

use metrics::{counter, histogram};

/// Record the outcome of one analysis request.
pub fn record_analysis(outcome: &'static str) {
    counter!("colposcopy_analyses_total", "outcome" => outcome).increment(1);
}

/// Record provider latency.
pub fn record_provider_latency(provider: &'static str, model: &str, duration_secs: f64) {
    histogram!(
        "colposcopy_provider_latency_seconds",
        "provider" => provider,
        "model" => model.to_string()
    )
    .record(duration_secs);
}

/// Record token usage.
pub fn record_tokens(model: &str, input_tokens: u64, output_tokens: u64) {
    counter!("colposcopy_tokens_total", "model" => model.to_string(), "type" => "input")
        .increment(input_tokens);
    counter!("colposcopy_tokens_total", "model" => model.to_string(), "type" => "output")
        .increment(output_tokens);
}

/// Record a provider error.
pub fn record_provider_error(provider: &'static str, error_type: &'static str) {
    counter!(
        "colposcopy_provider_errors_total",
        "provider" => provider,
        "error_type" => error_type
    )
    .increment(1);
}
