use crate::state::AppState;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};

pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService { service }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let endpoint = format!("{} {}", method, path);

        // The reverse proxy probes /health continuously; count those toward
        // the totals but keep them out of the per-endpoint map so relay
        // traffic isn't drowned out
        let is_health_probe = path == "/health";

        if let Some(app_state) = req.app_data::<web::Data<AppState>>() {
            app_state.increment_request_count();
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            // The fallback policy answers upstream outages with 200, so status
            // codes here only capture auth/validation failures; upstream
            // failures are counted separately by the handlers.
            let is_error = match &result {
                Ok(response) => {
                    response.status().is_client_error() || response.status().is_server_error()
                }
                Err(_) => true,
            };

            if let Ok(response) = &result {
                if let Some(app_state) = response.request().app_data::<web::Data<AppState>>() {
                    if !is_health_probe {
                        app_state.record_endpoint_request(&endpoint, duration_ms, is_error);
                    }

                    if is_error {
                        app_state.increment_error_count();
                    }
                }
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{test, App, HttpResponse};

    #[actix_web::test]
    async fn test_health_probes_stay_out_of_endpoint_metrics() {
        let state = AppState::new(AppConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(MetricsMiddleware)
                .route("/health", web::get().to(HttpResponse::Ok))
                .route("/api/v1/metrics", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        test::call_service(&app, req).await;
        let req = test::TestRequest::get().uri("/api/v1/metrics").to_request();
        test::call_service(&app, req).await;

        let snapshot = state.get_metrics_snapshot();
        // Both requests counted in the totals
        assert_eq!(snapshot.request_count, 2);
        // But only real traffic shows up per endpoint
        assert!(!snapshot.endpoint_metrics.contains_key("GET /health"));
        assert!(snapshot.endpoint_metrics.contains_key("GET /api/v1/metrics"));
    }

    #[actix_web::test]
    async fn test_error_responses_counted() {
        let state = AppState::new(AppConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(MetricsMiddleware)
                .route("/missing", web::get().to(HttpResponse::NotFound)),
        )
        .await;

        let req = test::TestRequest::get().uri("/missing").to_request();
        test::call_service(&app, req).await;

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.endpoint_metrics["GET /missing"].error_count, 1);
    }
}
