//! # Message Analysis Relay
//!
//! `POST /api/analyze-message`: verify the caller, forward the message to the
//! upstream analysis service, and return its body unchanged.
//!
//! ## Failure policy:
//! When the upstream call fails (network error, non-2xx, undecodable body)
//! and `resilience.fallback_on_upstream_error` is on, the handler answers
//! HTTP 200 with the fixed SAFE fallback so the user's send is never blocked
//! by an analysis outage. The substitution is logged and counted. With the
//! policy off, the failure surfaces as 502.

use crate::analysis::{AnalysisClient, AnalysisResult, MessageRequest};
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use tracing::{debug, warn};

pub async fn analyze_message(
    user: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<MessageRequest>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();

    // Identity check happens before any upstream traffic
    user.ensure_matches(&request.user_id)?;

    debug!(
        user_id = %request.user_id,
        room_id = %request.room_id,
        message_len = request.message.len(),
        "Relaying message for analysis"
    );

    let config = state.get_config();
    let client = AnalysisClient::new(state.http_client.clone(), config.upstream.analysis_url);

    match client.analyze(&request).await {
        Ok(result) => Ok(HttpResponse::Ok().json(result)),
        Err(err) => {
            state.record_upstream_failure();

            if !config.resilience.fallback_on_upstream_error {
                return Err(err);
            }

            warn!(
                error = %err,
                user_id = %request.user_id,
                "Upstream analysis failed, substituting fallback response"
            );
            state.record_fallback_response();

            Ok(HttpResponse::Ok().json(AnalysisResult::fallback()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{test, App};

    fn test_state() -> AppState {
        let mut config = AppConfig::default();
        // Nothing listens here, so every upstream call fails fast
        config.upstream.analysis_url = "http://127.0.0.1:9".to_string();
        config.upstream.request_timeout_ms = 200;
        AppState::new(config)
    }

    #[actix_web::test]
    async fn test_unauthenticated_request_is_rejected() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/api/analyze-message", web::post().to(analyze_message)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/analyze-message")
            .set_json(serde_json::json!({"message": "hi", "user_id": "2"}))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
        // Auth failed before any upstream call could be attempted
        assert_eq!(state.get_metrics_snapshot().upstream_failures, 0);
    }

    #[actix_web::test]
    async fn test_user_id_mismatch_is_forbidden() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/api/analyze-message", web::post().to(analyze_message)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/analyze-message")
            .insert_header(("authorization", "Bearer 1"))
            .set_json(serde_json::json!({"message": "hi", "user_id": "2"}))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 403);
        assert_eq!(state.get_metrics_snapshot().upstream_failures, 0);
    }

    #[actix_web::test]
    async fn test_upstream_failure_yields_fallback_200() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/api/analyze-message", web::post().to(analyze_message)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/analyze-message")
            .insert_header(("authorization", "Bearer 2"))
            .set_json(serde_json::json!({"message": "hi", "user_id": "2"}))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["risk_level"], "SAFE");
        assert_eq!(body["confidence"], 0.5);
        assert_eq!(body["status"], "fallback");

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.upstream_failures, 1);
        assert_eq!(snapshot.fallback_responses, 1);
    }

    #[actix_web::test]
    async fn test_upstream_failure_surfaces_502_when_fallback_off() {
        let state = test_state();
        {
            let mut config = state.get_config();
            config.resilience.fallback_on_upstream_error = false;
            state.update_config(config).unwrap();
        }

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/api/analyze-message", web::post().to(analyze_message)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/analyze-message")
            .insert_header(("authorization", "Bearer 2"))
            .set_json(serde_json::json!({"message": "hi", "user_id": "2"}))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 502);
        assert_eq!(state.get_metrics_snapshot().fallback_responses, 0);
    }
}
