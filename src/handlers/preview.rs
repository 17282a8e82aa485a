//! # Preview/Compliance Relay
//!
//! `POST /api/preview-message`: check a draft message before it is sent.
//! Fans out to the upstream policy check and message analysis concurrently
//! and merges the results into one response; a failed leg is absent from the
//! merged object rather than failing the request.

use crate::analysis::{preview::run_preview, AnalysisClient, PreviewRequest};
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use tracing::debug;

pub async fn preview_message(
    user: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<PreviewRequest>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();

    user.ensure_matches(&request.message.user_id)?;

    debug!(
        user_id = %request.message.user_id,
        policies = ?request.policies,
        "Running preview fan-out"
    );

    let config = state.get_config();
    let client = AnalysisClient::new(state.http_client.clone(), config.upstream.analysis_url);

    let response = run_preview(&client, &request).await;

    // run_preview absorbs leg failures; account for them here
    if response.analysis.is_none() {
        state.record_upstream_failure();
    }
    if response.policy_compliance.is_none() {
        state.record_upstream_failure();
    }

    Ok(HttpResponse::Ok().json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{test, App};

    fn test_state() -> AppState {
        let mut config = AppConfig::default();
        config.upstream.analysis_url = "http://127.0.0.1:9".to_string();
        config.upstream.request_timeout_ms = 200;
        AppState::new(config)
    }

    #[actix_web::test]
    async fn test_preview_survives_total_upstream_outage() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/api/preview-message", web::post().to(preview_message)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/preview-message")
            .insert_header(("authorization", "Bearer 3"))
            .set_json(serde_json::json!({
                "message": "来週の売上データを共有します",
                "user_id": "3",
                "policies": ["confidential"]
            }))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = test::read_body_json(resp).await;
        // Both legs down: sections absent, overall SAFE
        assert_eq!(body["risk_level"], "SAFE");
        assert!(body.get("analysis").is_none());
        assert!(body.get("policy_compliance").is_none());

        // Both failed legs were counted
        assert_eq!(state.get_metrics_snapshot().upstream_failures, 2);
    }

    #[actix_web::test]
    async fn test_preview_rejects_mismatched_user() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/api/preview-message", web::post().to(preview_message)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/preview-message")
            .insert_header(("authorization", "Bearer 3"))
            .set_json(serde_json::json!({"message": "hi", "user_id": "4"}))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 403);
    }
}
