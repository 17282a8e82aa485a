//! Runtime configuration endpoints: inspect the effective config and apply
//! partial updates without a restart.

use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

fn config_view(config: &crate::config::AppConfig) -> serde_json::Value {
    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port
        },
        "upstream": {
            "analysis_url": config.upstream.analysis_url,
            "realtime_ws_url": config.upstream.realtime_ws_url,
            "request_timeout_ms": config.upstream.request_timeout_ms
        },
        "audio": {
            "sample_rate": config.audio.sample_rate,
            "channels": config.audio.channels,
            "bit_depth": config.audio.bit_depth,
            "chunk_size": config.audio.chunk_size,
            "audio_format": config.audio.audio_format
        },
        "auth": {
            "require_auth": config.auth.require_auth
        },
        "resilience": {
            "fallback_on_upstream_error": config.resilience.fallback_on_upstream_error,
            "reconnect_delay_ms": config.resilience.reconnect_delay_ms,
            "max_reconnect_attempts": config.resilience.max_reconnect_attempts
        },
        "performance": {
            "max_concurrent_sessions": config.performance.max_concurrent_sessions
        }
    })
}

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config_view(&config)
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config.update_from_json(&json_str)?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": config_view(&current_config)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_partial_update_flips_fallback_policy() {
        let state = AppState::new(AppConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/api/v1/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/api/v1/config")
            .set_json(serde_json::json!({
                "resilience": {"fallback_on_upstream_error": false}
            }))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert!(!state.get_config().resilience.fallback_on_upstream_error);
        // Untouched sections keep their values
        assert_eq!(state.get_config().audio.sample_rate, 16000);
    }

    #[actix_web::test]
    async fn test_invalid_update_is_rejected() {
        let state = AppState::new(AppConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/api/v1/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/api/v1/config")
            .set_json(serde_json::json!({"server": {"port": 0}}))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_client_error() || resp.status().is_server_error());
        // Config unchanged after the rejected update
        assert_eq!(state.get_config().server.port, 8080);
    }
}
