//! Recommendation Service Metrics
//!
//! Prometheus metrics for the HTTP surface and the recommendation pipeline

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::time::Duration;

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "http_requests_total",
        "Total HTTP requests by method, path and status",
        &["method", "path", "status"]
    )
    .expect("Failed to register http requests metric")
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latency",
        &["method", "path"],
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register http duration metric")
});

static RECOMMENDATION_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "recommendation_requests_total",
        "Recommendation requests by experiment group and outcome",
        &["exp_group", "status"]
    )
    .expect("Failed to register recommendation requests metric")
});

static RECOMMENDATION_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "recommendation_duration_seconds",
        "Duration of recommendation pipeline stages",
        &["stage"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("Failed to register recommendation duration metric")
});

/// Record one HTTP request
pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(elapsed.as_secs_f64());
}

/// Record recommendation outcome (success/error) for a group
pub fn record_recommendation(exp_group: &str, status: &str) {
    RECOMMENDATION_REQUESTS_TOTAL
        .with_label_values(&[exp_group, status])
        .inc();
}

/// Record duration of a pipeline stage (load_model, load_features, score, total)
pub fn observe_stage(stage: &str, duration: Duration) {
    RECOMMENDATION_DURATION_SECONDS
        .with_label_values(&[stage])
        .observe(duration.as_secs_f64());
}

/// GET /metrics
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_metrics_are_gathered() {
        record_recommendation("control", "success");
        observe_stage("score", Duration::from_millis(12));
        observe_http_request("GET", "/post/recommendations/", 200, Duration::from_millis(40));

        let names: Vec<String> = prometheus::gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();

        assert!(names.contains(&"recommendation_requests_total".to_string()));
        assert!(names.contains(&"recommendation_duration_seconds".to_string()));
        assert!(names.contains(&"http_requests_total".to_string()));
    }
}
