//! # Application State Management
//!
//! This module manages shared state that needs to be accessed by multiple HTTP request handlers
//! simultaneously.
//!
//! ## Arc<RwLock<T>> Pattern
//! - **Arc**: Multiple ownership (many HTTP handlers can hold a reference)
//! - **RwLock**: Multiple readers OR one writer at a time
//! - **T**: The actual data type being protected
//!
//! Besides config and metrics, the state owns the long-lived `reqwest::Client`
//! used for all upstream HTTP calls. Reusing one client keeps connection pools
//! warm across requests instead of re-dialing the upstream per call.

use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// The main application state that's shared across all HTTP request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Performance metrics (constantly being updated by requests)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Shared HTTP client for upstream analysis/health calls
    pub http_client: reqwest::Client,

    /// When the server started (never changes, so no Arc<RwLock> needed)
    pub start_time: Instant,
}

/// Performance metrics collected across all HTTP requests.
///
/// ## Relay-specific counters:
/// - **upstream_failures**: upstream AI calls that errored or returned non-2xx
/// - **fallback_responses**: requests answered with the fixed SAFE fallback.
///   The fallback policy returns 200 to clients, so these counters are the
///   only place an upstream outage shows up.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    /// Current number of active audio relay sessions
    pub active_sessions: u32,

    /// Upstream AI calls that failed (network error or non-2xx)
    pub upstream_failures: u64,

    /// Responses where the fixed fallback payload was substituted
    pub fallback_responses: u64,

    /// Detailed metrics for each API endpoint (e.g. "POST /api/analyze-message")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    /// Number of requests to this specific endpoint
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    /// Number of errors that occurred for this endpoint
    pub error_count: u64,
}

impl AppState {
    /// Create a new AppState with the given configuration.
    ///
    /// The shared HTTP client is built with the configured upstream request
    /// timeout; per-call timeouts are not re-negotiated after that.
    pub fn new(config: AppConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.upstream.request_timeout_ms))
            .build()
            .unwrap_or_default();

        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            http_client,
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// ## Why clone:
    /// Cloning releases the lock immediately, so other threads aren't blocked.
    /// AppConfig is designed to be cheap to clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Update the configuration with validation.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Increment the total error counter (called when any request fails).
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record that an upstream AI call failed.
    pub fn record_upstream_failure(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.upstream_failures += 1;
    }

    /// Record that a request was answered with the fixed fallback payload.
    pub fn record_fallback_response(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.fallback_responses += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Increment the active sessions counter (called when an audio relay session starts).
    pub fn increment_active_sessions(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_sessions += 1;
    }

    /// Decrement the active sessions counter (called when an audio relay session ends).
    ///
    /// Includes an underflow check so a double-close never wraps the counter.
    pub fn decrement_active_sessions(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// Clones the data so we don't hold the lock while serializing the HTTP
    /// response.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_sessions: metrics.active_sessions,
            upstream_failures: metrics.upstream_failures,
            fallback_responses: metrics.fallback_responses,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Calculate the average response time for this endpoint.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Calculate the error rate for this endpoint (0.0 to 1.0).
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

    #[test]
    fn test_fallback_counters() {
        let state = AppState::new(AppConfig::default());
        state.record_upstream_failure();
        state.record_fallback_response();
        state.record_fallback_response();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.upstream_failures, 1);
        assert_eq!(snapshot.fallback_responses, 2);
    }

    #[test]
    fn test_active_sessions_never_underflow() {
        let state = AppState::new(AppConfig::default());
        state.decrement_active_sessions();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);

        state.increment_active_sessions();
        state.decrement_active_sessions();
        state.decrement_active_sessions();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);
    }

    #[test]
    fn test_endpoint_metric_rates() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("POST /api/analyze-message", 40, false);
        state.record_endpoint_request("POST /api/analyze-message", 60, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["POST /api/analyze-message"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 50.0);
        assert_eq!(metric.error_rate(), 0.5);
    }
}
