//! # Audio Session Descriptor
//!
//! `GET|POST /api/audio-analysis`: the health-gated handshake a client goes
//! through before opening the realtime WebSocket. The relay probes the
//! upstream analysis service; if the probe fails the client gets a 503 and
//! never attempts the WebSocket upgrade.

use crate::analysis::AnalysisClient;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::warn;

pub async fn audio_analysis(
    _user: AuthUser,
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let config = state.get_config();
    let client = AnalysisClient::new(
        state.http_client.clone(),
        config.upstream.analysis_url.clone(),
    );

    if !client.health_check(&config.upstream.health_path).await {
        warn!(
            url = %config.upstream.analysis_url,
            "Upstream unhealthy, refusing audio session descriptor"
        );
        return Err(AppError::ServiceUnavailable(
            "Realtime analysis backend is not available".to_string(),
        ));
    }

    // The browser connects back to this relay, not to the upstream directly
    let conn = req.connection_info();
    let ws_scheme = if conn.scheme() == "https" { "wss" } else { "ws" };
    let websocket_url = format!("{}://{}/ws/realtime-analysis", ws_scheme, conn.host());

    Ok(HttpResponse::Ok().json(json!({
        "websocket_url": websocket_url,
        "session_config": {
            "sample_rate": config.audio.sample_rate,
            "chunk_size": config.audio.chunk_size,
            "audio_format": config.audio.audio_format
        },
        "backend_status": "connected",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_descriptor_gated_on_upstream_health() {
        let mut config = AppConfig::default();
        config.upstream.analysis_url = "http://127.0.0.1:9".to_string();
        config.upstream.request_timeout_ms = 200;
        let state = AppState::new(config);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/audio-analysis", web::get().to(audio_analysis)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/audio-analysis")
            .insert_header(("authorization", "Bearer 2"))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 503);
    }

    #[actix_web::test]
    async fn test_descriptor_requires_auth() {
        let state = AppState::new(AppConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/audio-analysis", web::get().to(audio_analysis)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/audio-analysis").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }
}
