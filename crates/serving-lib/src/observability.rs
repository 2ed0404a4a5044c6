//! Observability infrastructure for the prediction service
//!
//! Provides:
//! - Prometheus metrics (HTTP requests, predictions, feature statistics, drift)
//! - Structured JSON logging with tracing

use crate::models::FeatureMap;
use crate::stats::{FeatureStatistics, FeatureStatisticsBuffer, DEFAULT_BUFFER_CAPACITY};
use prometheus::{
    core::Collector, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Inference latency recorded when the caller has no measurement
pub const PLACEHOLDER_INFERENCE_LATENCY: Duration = Duration::from_millis(1);

struct ServingMetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    prediction_count: IntCounterVec,
    prediction_errors: IntCounterVec,
    feature_values: HistogramVec,
    feature_mean: GaugeVec,
    feature_stddev: GaugeVec,
    prediction_latency_seconds: HistogramVec,
    data_drift_score: GaugeVec,
    model_info: GaugeVec,
    buffer: FeatureStatisticsBuffer,
}

fn register<C: Collector + Clone + 'static>(registry: &Registry, collector: C) -> prometheus::Result<C> {
    registry.register(Box::new(collector.clone()))?;
    Ok(collector)
}

impl ServingMetricsInner {
    fn new(buffer_capacity: usize) -> prometheus::Result<Self> {
        let registry = Registry::new();

        Ok(Self {
            http_requests_total: register(
                &registry,
                IntCounterVec::new(
                    Opts::new("http_requests_total", "Total number of HTTP requests"),
                    &["method", "endpoint", "status_code"],
                )?,
            )?,

            http_request_duration_seconds: register(
                &registry,
                HistogramVec::new(
                    HistogramOpts::new(
                        "http_request_duration_seconds",
                        "HTTP request latency in seconds",
                    )
                    .buckets(LATENCY_BUCKETS.to_vec()),
                    &["method", "endpoint"],
                )?,
            )?,

            prediction_count: register(
                &registry,
                IntCounterVec::new(
                    Opts::new("model_prediction_count", "Number of predictions by class"),
                    &["model_name", "class_name"],
                )?,
            )?,

            prediction_errors: register(
                &registry,
                IntCounterVec::new(
                    Opts::new("model_prediction_errors_total", "Number of failed predictions"),
                    &["model_name", "error_kind"],
                )?,
            )?,

            feature_values: register(
                &registry,
                HistogramVec::new(
                    HistogramOpts::new(
                        "model_feature_values",
                        "Raw values of features observed in predictions",
                    ),
                    &["feature"],
                )?,
            )?,

            feature_mean: register(
                &registry,
                GaugeVec::new(
                    Opts::new(
                        "prediction_feature_mean",
                        "Mean value of each feature in predictions",
                    ),
                    &["model_name", "feature"],
                )?,
            )?,

            feature_stddev: register(
                &registry,
                GaugeVec::new(
                    Opts::new(
                        "prediction_feature_stddev",
                        "Standard deviation of each feature in predictions",
                    ),
                    &["model_name", "feature"],
                )?,
            )?,

            prediction_latency_seconds: register(
                &registry,
                HistogramVec::new(
                    HistogramOpts::new(
                        "model_prediction_latency_seconds",
                        "Time taken for model to make predictions",
                    )
                    .buckets(LATENCY_BUCKETS.to_vec()),
                    &["model_name"],
                )?,
            )?,

            data_drift_score: register(
                &registry,
                GaugeVec::new(
                    Opts::new(
                        "model_data_drift_score",
                        "Measure of drift between training and prediction data",
                    ),
                    &["model_name", "feature"],
                )?,
            )?,

            model_info: register(
                &registry,
                GaugeVec::new(
                    Opts::new("model_info", "Information about the currently loaded model"),
                    &["model_name", "model_version", "kind"],
                )?,
            )?,

            buffer: FeatureStatisticsBuffer::new(buffer_capacity),
            registry,
        })
    }
}

/// Metrics registry for the prediction service
///
/// Each instance owns its own Prometheus registry and feature buffer;
/// clones share them. Tests create isolated instances.
#[derive(Clone)]
pub struct ServingMetrics {
    inner: Arc<ServingMetricsInner>,
}

impl ServingMetrics {
    /// Create a registry with the default feature buffer capacity
    pub fn new() -> prometheus::Result<Self> {
        Self::with_buffer_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_buffer_capacity(capacity: usize) -> prometheus::Result<Self> {
        Ok(Self {
            inner: Arc::new(ServingMetricsInner::new(capacity)?),
        })
    }

    /// Mark the start of an HTTP request
    pub fn record_request_start(&self, _method: &str, _path: &str) -> Instant {
        Instant::now()
    }

    /// Count a finished HTTP request and observe its latency
    pub fn record_request_end(&self, start: Instant, method: &str, path: &str, status_code: u16) {
        let status = status_code.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[method, path, &status])
            .inc();
        self.inner
            .http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(start.elapsed().as_secs_f64());
    }

    /// Record a prediction with the placeholder inference latency
    pub fn record_prediction(&self, model_name: &str, features: &FeatureMap, predicted_class: &str) {
        self.record_prediction_with_latency(
            model_name,
            features,
            predicted_class,
            PLACEHOLDER_INFERENCE_LATENCY,
        );
    }

    /// Record a prediction: count it, buffer its features, refresh the
    /// feature statistics gauges and observe the inference latency
    pub fn record_prediction_with_latency(
        &self,
        model_name: &str,
        features: &FeatureMap,
        predicted_class: &str,
        latency: Duration,
    ) {
        self.inner
            .prediction_count
            .with_label_values(&[model_name, predicted_class])
            .inc();

        self.inner
            .buffer
            .push_with(model_name, features.clone(), |stats| {
                self.publish_feature_statistics(model_name, stats)
            });

        self.inner
            .prediction_latency_seconds
            .with_label_values(&[model_name])
            .observe(latency.as_secs_f64());
    }

    fn publish_feature_statistics(&self, model_name: &str, stats: &[FeatureStatistics]) {
        for stat in stats {
            self.inner
                .feature_mean
                .with_label_values(&[model_name, &stat.feature])
                .set(stat.mean);
            if let Some(stddev) = stat.stddev {
                self.inner
                    .feature_stddev
                    .with_label_values(&[model_name, &stat.feature])
                    .set(stddev);
            }
        }
    }

    /// Count a failed prediction
    pub fn inc_prediction_errors(&self, model_name: &str, error_kind: &str) {
        self.inner
            .prediction_errors
            .with_label_values(&[model_name, error_kind])
            .inc();
    }

    /// Store an externally computed drift score
    pub fn update_data_drift(&self, model_name: &str, feature: &str, score: f64) {
        self.inner
            .data_drift_score
            .with_label_values(&[model_name, feature])
            .set(score);
    }

    /// Observe raw feature values directly
    pub fn record_feature_values<I, S>(&self, values: I)
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: AsRef<str>,
    {
        for (feature, observations) in values {
            let histogram = self
                .inner
                .feature_values
                .with_label_values(&[feature.as_ref()]);
            for value in observations {
                histogram.observe(value);
            }
        }
    }

    /// Publish which model is currently served
    pub fn set_model_info(&self, model_name: &str, version: &str, kind: &str) {
        self.inner.model_info.reset();
        self.inner
            .model_info
            .with_label_values(&[model_name, version, kind])
            .set(1.0);
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn snapshot(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Content type of [`snapshot`](Self::snapshot)
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn feature_buffer(&self) -> &FeatureStatisticsBuffer {
        &self.inner.buffer
    }

    /// Number of buffered feature mappings for a model
    pub fn buffer_len(&self, model_name: &str) -> usize {
        self.inner.buffer.len(model_name)
    }
}

/// Structured logger for service events
///
/// Provides consistent JSON-formatted logging for model loads,
/// predictions and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, default_model: &str) {
        info!(
            event = "server_started",
            instance = %self.instance,
            server_version = %version,
            default_model = %default_model,
            "Model server started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Model server shutting down"
        );
    }

    /// Log a successful model load
    pub fn log_model_loaded(&self, model: &str, version: &str, kind: &str) {
        info!(
            event = "model_loaded",
            instance = %self.instance,
            model = %model,
            model_version = %version,
            kind = %kind,
            "Model loaded"
        );
    }

    /// Log a failed model load
    pub fn log_model_load_failed(&self, model: &str, reason: &str) {
        error!(
            event = "model_load_failed",
            instance = %self.instance,
            model = %model,
            reason = %reason,
            "Failed to load model, predictions will be unavailable"
        );
    }

    /// Log a served prediction
    pub fn log_prediction(&self, model: &str, prediction: &str, elapsed: Duration) {
        info!(
            event = "prediction_served",
            instance = %self.instance,
            model = %model,
            prediction = %prediction,
            elapsed_us = elapsed.as_micros() as u64,
            "Prediction served"
        );
    }

    /// Log a degraded probability computation
    pub fn log_probability_failure(&self, model: &str, reason: &str) {
        warn!(
            event = "probability_failed",
            instance = %self.instance,
            model = %model,
            reason = %reason,
            "Probability computation failed, omitting from response"
        );
    }
}
