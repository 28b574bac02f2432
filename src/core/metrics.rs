//! Prometheus metrics for monitoring body transformation.
//!
//! Recording helpers are no-ops until [`init_metrics`] has been called, so the
//! middleware can be embedded in hosts that do not expose metrics.

use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};
use std::sync::OnceLock;

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of transform calls by mode and outcome
    pub transforms: IntCounterVec,

    /// Transform call duration histogram in seconds, including engine setup
    pub transform_duration: HistogramVec,

    /// Lua runtimes handed to transform calls, by source (fresh or pooled)
    pub engine_instances: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// This should be called once at application startup. Subsequent calls will
/// return the same instance.
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let transforms = register_int_counter_vec!(
            "body_transform_transforms_total",
            "Total number of body transform calls",
            &["mode", "outcome"]
        )
        .expect("Failed to register transforms metric");

        let transform_duration = register_histogram_vec!(
            "body_transform_duration_seconds",
            "Body transform duration in seconds",
            &["mode"],
            vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5, 1.0]
        )
        .expect("Failed to register transform_duration metric");

        let engine_instances = register_int_counter_vec!(
            "body_transform_engine_instances_total",
            "Lua runtimes handed to transform calls",
            &["source"]
        )
        .expect("Failed to register engine_instances metric");

        Metrics {
            transforms,
            transform_duration,
            engine_instances,
        }
    })
}

/// Get the global metrics instance, if initialized.
pub fn get_metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

/// Record the outcome and duration of one transform call.
pub fn record_transform(mode: &str, outcome: &str, duration_secs: f64) {
    if let Some(metrics) = get_metrics() {
        metrics
            .transforms
            .with_label_values(&[mode, outcome])
            .inc();
        metrics
            .transform_duration
            .with_label_values(&[mode])
            .observe(duration_secs);
    }
}

/// Record that a runtime was handed to a transform call.
pub fn record_engine_instance(source: &str) {
    if let Some(metrics) = get_metrics() {
        metrics.engine_instances.with_label_values(&[source]).inc();
    }
}
