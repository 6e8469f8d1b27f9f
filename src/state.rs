//! # Application State Management
//!
//! Shared state handed to every request handler through `web::Data`.
//!
//! ## What lives here:
//! - **config**: the validated configuration, read-only after startup
//! - **pipeline**: the transcribe-and-translate pipeline with its
//!   process-wide model handles
//! - **metrics**: request counters, the only state requests mutate
//!
//! ## Arc<RwLock<T>> Pattern
//! Metrics are written by every request and read by the health endpoints.
//! `parking_lot::RwLock` allows many concurrent readers or one writer and
//! never poisons, so no lock result has to be unwrapped.

use crate::config::AppConfig;
use crate::pipeline::Pipeline;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// The main application state shared across all HTTP requests.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, fixed for the lifetime of the process
    pub config: Arc<AppConfig>,

    /// Pipeline with the loaded recognizer, translator and normalizer
    pub pipeline: Pipeline,

    /// Performance metrics
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started, for uptime reporting
    pub start_time: Instant,
}

/// Application-wide performance metrics.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests received since startup
    pub request_count: u64,

    /// Total number of requests that resulted in errors (4xx/5xx)
    pub error_count: u64,

    /// Pipeline runs currently in progress
    pub active_jobs: u32,

    /// Per-endpoint metrics keyed by "METHOD /route/pattern"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

/// Keeps `active_jobs` accurate even when a request future is dropped
/// mid-flight.
pub struct ActiveJob {
    metrics: Arc<RwLock<AppMetrics>>,
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        let mut metrics = self.metrics.write();
        metrics.active_jobs = metrics.active_jobs.saturating_sub(1);
    }
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: Pipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    pub fn increment_request_count(&self) {
        self.metrics.write().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics.write().error_count += 1;
    }

    /// Record one finished request for `endpoint`.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Mark a pipeline run as started; it ends when the guard drops.
    pub fn start_job(&self) -> ActiveJob {
        self.metrics.write().active_jobs += 1;
        ActiveJob {
            metrics: self.metrics.clone(),
        }
    }

    /// Consistent copy of the metrics, so the lock isn't held while
    /// building a response.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn state() -> AppState {
        AppState::new(
            AppConfig::default(),
            pipeline(
                FakeNormalizer::new(NormalizerBehavior::PassThrough),
                FakeRecognizer::returning("", "en"),
                FakeTranslator::new(),
            ),
        )
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = state();
        state.record_endpoint_request("POST /v1/transcribe_translate", 100, false);
        state.record_endpoint_request("POST /v1/transcribe_translate", 300, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["POST /v1/transcribe_translate"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 200.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_active_job_guard() {
        let state = state();
        let first = state.start_job();
        let second = state.start_job();
        assert_eq!(state.get_metrics_snapshot().active_jobs, 2);

        drop(first);
        drop(second);
        assert_eq!(state.get_metrics_snapshot().active_jobs, 0);
    }

    #[test]
    fn test_empty_endpoint_metric() {
        let metric = EndpointMetric::default();
        assert_eq!(metric.average_duration_ms(), 0.0);
        assert_eq!(metric.error_rate(), 0.0);
    }
}
