//! # SafeComm Backend - Main Application Entry Point
//!
//! Communication guardrail relay: a thin service between the demo chat
//! frontend and the AI analysis backend. It verifies callers, forwards
//! analysis and preview requests, masks upstream outages with a fixed SAFE
//! fallback, and relays real-time audio sessions over WebSocket.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (TOML file + environment variables)
//! - **state**: shared state, metrics, and the pooled upstream HTTP client
//! - **auth**: bearer-token verification against the demo user table
//! - **analysis**: typed upstream client, payload types, preview merge
//! - **audio**: PCM utilities, playback scheduling, session lifecycle
//! - **relay**: WebSocket control frames, reconnect policy, upstream socket
//! - **websocket**: the browser-facing realtime WebSocket actor
//! - **handlers**: REST endpoints
//! - **middleware**: request logging and metrics collection

mod analysis;
mod audio;
mod auth;
mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod relay;
mod state;
mod websocket;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use audio::session::SessionManager;
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown flag set by the signal handlers.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting safecomm-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Upstream analysis: {} | realtime: {}",
        config.upstream.analysis_url, config.upstream.realtime_ws_url
    );
    if !config.auth.require_auth {
        info!("Authentication disabled, running in open demo mode");
    }

    let app_state = AppState::new(config.clone());
    // One registry for all WebSocket connections, so the concurrent session
    // cap holds across the whole process
    let session_manager = web::Data::new(SessionManager::new(
        config.performance.max_concurrent_sessions,
    ));
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        // The demo frontend is served from a different origin
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(session_manager.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            // Relay surface, matching the reverse proxy's /api/* routes
            .route(
                "/api/analyze-message",
                web::post().to(handlers::analyze::analyze_message),
            )
            .route(
                "/api/preview-message",
                web::post().to(handlers::preview::preview_message),
            )
            .route(
                "/api/audio-analysis",
                web::get().to(handlers::audio::audio_analysis),
            )
            .route(
                "/api/audio-analysis",
                web::post().to(handlers::audio::audio_analysis),
            )
            .route(
                "/ws/realtime-analysis",
                web::get().to(websocket::realtime_analysis),
            )
            // Operational endpoints
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::config::get_config))
                    .route("/config", web::put().to(handlers::config::update_config)),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize structured logging.
///
/// `RUST_LOG` controls the filter; without it the relay logs its own spans at
/// debug and the framework at info.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "safecomm_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Install SIGTERM/SIGINT handlers that flip the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag until it is set.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
