//! # Upstream Analysis Client
//!
//! Thin HTTP client for the external LLM-backed analysis service. Forwards
//! payloads, decodes responses, and reports upstream failures as
//! `AppError::UpstreamUnavailable` — whether that surfaces to the caller or is
//! replaced by the fallback payload is the handler's decision.
//!
//! No retries, no backoff, no caching: one request in, one response out.

use crate::analysis::types::{AnalysisResult, MessageRequest, PolicyCompliance};
use crate::error::{AppError, AppResult};
use tracing::{debug, warn};

/// Client for the upstream analysis/policy endpoints.
///
/// Cheap to clone: holds the shared `reqwest::Client` (itself an Arc) and the
/// base URL.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    base_url: String,
}

impl AnalysisClient {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        // Trailing slashes would produce `//api/...` when joining paths
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// Forward a message to the upstream analyzer.
    ///
    /// A 2xx response is decoded as [`AnalysisResult`] (unknown fields
    /// preserved); anything else is an upstream failure.
    pub async fn analyze(&self, request: &MessageRequest) -> AppResult<AnalysisResult> {
        let url = format!("{}/api/analyze-message", self.base_url);
        debug!(url = %url, user_id = %request.user_id, "Forwarding message to upstream analyzer");

        let response = self.http.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(url = %url, status = %status, "Upstream analyzer returned an error status");
            return Err(AppError::UpstreamUnavailable(format!(
                "Analysis service returned {}",
                status
            )));
        }

        let result = response.json::<AnalysisResult>().await.map_err(|e| {
            warn!(url = %url, error = %e, "Upstream analyzer returned an undecodable body");
            AppError::UpstreamUnavailable(format!("Invalid analysis response: {}", e))
        })?;

        Ok(result)
    }

    /// Ask the upstream policy agent whether a message complies with the
    /// given policies.
    pub async fn check_policy(
        &self,
        request: &MessageRequest,
        policies: &[String],
    ) -> AppResult<PolicyCompliance> {
        let url = format!("{}/api/check-policy", self.base_url);
        debug!(url = %url, policy_count = policies.len(), "Forwarding message to policy agent");

        let body = serde_json::json!({
            "message": request.message,
            "user_id": request.user_id,
            "policies": policies,
        });

        let response = self.http.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(url = %url, status = %status, "Upstream policy agent returned an error status");
            return Err(AppError::UpstreamUnavailable(format!(
                "Policy service returned {}",
                status
            )));
        }

        let result = response.json::<PolicyCompliance>().await.map_err(|e| {
            warn!(url = %url, error = %e, "Upstream policy agent returned an undecodable body");
            AppError::UpstreamUnavailable(format!("Invalid policy response: {}", e))
        })?;

        Ok(result)
    }

    /// Probe the upstream health endpoint.
    ///
    /// Used by `/api/audio-analysis` to gate session descriptors: a client
    /// should not be handed a WebSocket URL that points at a dead backend.
    pub async fn health_check(&self, health_path: &str) -> bool {
        let url = format!("{}{}", self.base_url, health_path);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(url = %url, status = %response.status(), "Upstream health probe failed");
                false
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Upstream health probe unreachable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let client = AnalysisClient::new(reqwest::Client::new(), "http://backend:8000/".to_string());
        assert_eq!(client.base_url, "http://backend:8000");
    }
}
