//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! ## Deployment Environment Variables:
//! Besides the APP_ prefixed variables, a few well-known names used by the
//! deployment setup are honored directly:
//! - `HOST` / `PORT`: server bind address (container platforms set these)
//! - `BACKEND_URL` / `ADK_BACKEND_URL`: base URL of the upstream analysis service
//! - `BACKEND_WS_URL`: WebSocket URL of the upstream real-time speech API

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, upstream, audio,
/// resilience) makes it easier to understand and maintain as the relay grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub audio: AudioConfig,
    pub auth: AuthConfig,
    pub resilience: ResilienceConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
/// - `port = 8080`: the port the reverse proxy routes `/api/*` and `/ws/*` to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Upstream AI service endpoints.
///
/// ## Fields:
/// - `analysis_url`: base URL of the LLM-backed message analysis service
/// - `realtime_ws_url`: WebSocket URL of the real-time speech API
/// - `health_path`: path probed before handing out audio session descriptors
/// - `request_timeout_ms`: per-request timeout for upstream HTTP calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub analysis_url: String,
    pub realtime_ws_url: String,
    pub health_path: String,
    pub request_timeout_ms: u64,
}

/// Audio session parameters advertised to clients and enforced at the boundary.
///
/// ## Format Requirements:
/// - **Sample Rate**: 16kHz (16,000 Hz)
/// - **Bit Depth**: 16-bit PCM, little-endian
/// - **Channels**: Mono (1 channel)
/// - **Chunk size**: 4096 samples per `audio_chunk` frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u8,
    pub bit_depth: u8,
    pub chunk_size: usize,
    pub audio_format: String,
}

/// Authentication settings.
///
/// ## Fields:
/// - `require_auth`: when false the relay runs open (hackathon demo mode);
///   when true every analysis/preview request needs a valid bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub require_auth: bool,
}

/// Failure-handling policy for upstream calls and the realtime relay.
///
/// ## Fields:
/// - `fallback_on_upstream_error`: when true (the default), upstream analysis
///   failures are masked with a fixed SAFE fallback and HTTP 200; when false
///   they surface as 502. Either way the failure is logged and counted.
/// - `reconnect_delay_ms`: fixed delay before re-dialing the upstream speech
///   socket after a non-clean close
/// - `max_reconnect_attempts`: cap on consecutive reconnect attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    pub fallback_on_upstream_error: bool,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
}

/// Performance tuning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            upstream: UpstreamConfig {
                analysis_url: "http://localhost:8000".to_string(),
                realtime_ws_url: "ws://localhost:8000/ws/live".to_string(),
                health_path: "/health".to_string(),
                request_timeout_ms: 10_000,
            },
            audio: AudioConfig {
                sample_rate: 16000,     // 16kHz - the speech API's expected rate
                channels: 1,            // Mono audio
                bit_depth: 16,          // 16-bit PCM
                chunk_size: 4096,       // samples per audio_chunk frame
                audio_format: "pcm16".to_string(),
            },
            auth: AuthConfig {
                require_auth: true,
            },
            resilience: ResilienceConfig {
                fallback_on_upstream_error: true,
                reconnect_delay_ms: 3000,
                max_reconnect_attempts: 5,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 10,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle the well-known deployment variables (HOST, PORT, BACKEND_URL,
    ///    ADK_BACKEND_URL, BACKEND_WS_URL)
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // Example: APP_SERVER_HOST becomes server.host in the config
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms set these without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        // ADK_BACKEND_URL takes precedence over the generic BACKEND_URL when
        // both are set, matching how the reverse proxy environment is wired.
        if let Ok(url) = env::var("BACKEND_URL") {
            settings = settings.set_override("upstream.analysis_url", url)?;
        }
        if let Ok(url) = env::var("ADK_BACKEND_URL") {
            settings = settings.set_override("upstream.analysis_url", url)?;
        }
        if let Ok(url) = env::var("BACKEND_WS_URL") {
            settings = settings.set_override("upstream.realtime_ws_url", url)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Upstream URLs are non-empty and have a usable scheme
    /// - Audio format matches what the speech API accepts (16-bit alignment)
    /// - Session and reconnect limits are sane
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.upstream.analysis_url.is_empty() {
            return Err(anyhow::anyhow!("Upstream analysis URL cannot be empty"));
        }

        if !self.upstream.realtime_ws_url.starts_with("ws://")
            && !self.upstream.realtime_ws_url.starts_with("wss://")
        {
            return Err(anyhow::anyhow!(
                "Upstream realtime URL must be a ws:// or wss:// URL, got '{}'",
                self.upstream.realtime_ws_url
            ));
        }

        if self.audio.bit_depth != 16 {
            return Err(anyhow::anyhow!(
                "Only 16-bit PCM is supported, got {} bits",
                self.audio.bit_depth
            ));
        }

        if self.audio.chunk_size == 0 {
            return Err(anyhow::anyhow!("Audio chunk size must be greater than 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.resilience.reconnect_delay_ms == 0 {
            return Err(anyhow::anyhow!("Reconnect delay must be greater than 0"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## Partial updates:
    /// This method allows updating only some fields, not the entire
    /// configuration. For example, `{"resilience": {"fallback_on_upstream_error": false}}`
    /// flips just the fallback policy.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(upstream) = partial_config.get("upstream") {
            if let Some(url) = upstream.get("analysis_url").and_then(|v| v.as_str()) {
                self.upstream.analysis_url = url.to_string();
            }
            if let Some(url) = upstream.get("realtime_ws_url").and_then(|v| v.as_str()) {
                self.upstream.realtime_ws_url = url.to_string();
            }
            if let Some(timeout) = upstream.get("request_timeout_ms").and_then(|v| v.as_u64()) {
                self.upstream.request_timeout_ms = timeout;
            }
        }

        if let Some(resilience) = partial_config.get("resilience") {
            if let Some(fallback) = resilience
                .get("fallback_on_upstream_error")
                .and_then(|v| v.as_bool())
            {
                self.resilience.fallback_on_upstream_error = fallback;
            }
            if let Some(delay) = resilience.get("reconnect_delay_ms").and_then(|v| v.as_u64()) {
                self.resilience.reconnect_delay_ms = delay;
            }
            if let Some(attempts) = resilience
                .get("max_reconnect_attempts")
                .and_then(|v| v.as_u64())
            {
                self.resilience.max_reconnect_attempts = attempts as u32;
            }
        }

        if let Some(performance) = partial_config.get("performance") {
            if let Some(sessions) = performance
                .get("max_concurrent_sessions")
                .and_then(|v| v.as_u64())
            {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
        }

        // Validate the updated configuration to ensure it's still valid
        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.chunk_size, 4096);
        assert!(config.resilience.fallback_on_upstream_error);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.upstream.realtime_ws_url = "http://not-a-ws-url".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.bit_depth = 24;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"resilience": {"fallback_on_upstream_error": false, "max_reconnect_attempts": 2}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert!(!config.resilience.fallback_on_upstream_error);
        assert_eq!(config.resilience.max_reconnect_attempts, 2);
        // Other fields should remain unchanged
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_config_update_rejects_invalid() {
        let mut config = AppConfig::default();
        let json = r#"{"server": {"port": 0}}"#;
        assert!(config.update_from_json(json).is_err());
    }
}
