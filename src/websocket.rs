//! # Realtime Analysis WebSocket
//!
//! The browser-facing leg of the audio relay. Clients connect to
//! `/ws/realtime-analysis`, start a session, and stream base64 PCM chunks;
//! the relay forwards them to the upstream speech API and relays the AI's
//! audio and transcription frames back.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: authenticated upgrade (bearer header or `?token=`)
//! 2. **start_session**: client supplies language/model/sample_rate; the
//!    relay dials the upstream and answers `session_started`
//! 3. **audio_chunk**: base64 16-bit mono PCM frames, validated then relayed
//! 4. **Downstream frames**: `ai_audio_response`, `ai_audio_stream`,
//!    `transcription` relayed as the upstream produces them
//! 5. **stop_session**: clean teardown of both legs, no reconnection

use crate::audio::pcm;
use crate::audio::session::{RelaySession, SessionManager, SessionParams};
use crate::relay::protocol::{ClientFrame, ServerFrame};
use crate::relay::reconnect::ReconnectPolicy;
use crate::relay::upstream::{UpstreamEvent, UpstreamHandle};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often the relay pings the browser.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Drop the connection when no pong arrives within this window.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket actor for one audio relay connection.
///
/// ## Actor Model:
/// Each browser connection is an independent actor. The upstream speech
/// socket runs as a separate tokio task; its events come back in through
/// actor messages so all session state lives on one thread.
pub struct AudioRelaySocket {
    /// Shared application state (config, metrics)
    app_state: web::Data<AppState>,

    /// Session registry shared across connections
    session_manager: Arc<SessionManager>,

    /// This connection's session, once start_session succeeds
    session: Option<Arc<RelaySession>>,

    /// Handle to the upstream speech connection task
    upstream: Option<UpstreamHandle>,

    /// Last heartbeat time
    last_heartbeat: Instant,

    /// Whether this connection was counted in the active-sessions gauge
    counted: bool,
}

impl AudioRelaySocket {
    pub fn new(app_state: web::Data<AppState>, session_manager: Arc<SessionManager>) -> Self {
        Self {
            app_state,
            session_manager,
            session: None,
            upstream: None,
            last_heartbeat: Instant::now(),
            counted: false,
        }
    }

    fn send_frame(&self, ctx: &mut ws::WebsocketContext<Self>, frame: &ServerFrame) {
        match serde_json::to_string(frame) {
            Ok(json) => ctx.text(json),
            Err(e) => error!(error = %e, "Failed to encode server frame"),
        }
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, code: &str, message: &str) {
        warn!(code = code, message = message, "Session error sent to client");
        self.send_frame(ctx, &ServerFrame::error(code, message));
    }

    /// Register the session and dial the upstream speech API.
    fn handle_start_session(
        &mut self,
        params: SessionParams,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        if self.session.is_some() {
            self.send_error(ctx, "session_error", "Session already started");
            return;
        }

        let config = self.app_state.get_config();

        if params.sample_rate != config.audio.sample_rate {
            self.send_error(
                ctx,
                "invalid_frame",
                &format!(
                    "Unsupported sample rate {} (expected {})",
                    params.sample_rate, config.audio.sample_rate
                ),
            );
            return;
        }

        let session = match self.session_manager.create_session(None, params.clone()) {
            Ok(session) => session,
            Err(err) => {
                self.send_error(ctx, "capacity_exceeded", &err);
                return;
            }
        };

        // create_session leaves the session Idle, so this cannot fail
        if let Err(e) = session.begin_connecting() {
            error!(error = %e, "Session transition failed on start");
        }

        self.app_state.increment_active_sessions();
        self.counted = true;
        self.session = Some(session.clone());

        info!(session_id = %session.session_id, "Relay session starting, dialing upstream");

        let url = config.upstream.realtime_ws_url.clone();
        let policy = ReconnectPolicy::new(
            config.resilience.reconnect_delay_ms,
            config.resilience.max_reconnect_attempts,
        );
        let addr = ctx.address();

        tokio::spawn(async move {
            match UpstreamHandle::connect(url, params, policy).await {
                Ok((handle, mut event_rx)) => {
                    addr.do_send(UpstreamConnected { handle });
                    while let Some(event) = event_rx.recv().await {
                        addr.do_send(UpstreamEventMsg(event));
                    }
                }
                Err(err) => {
                    error!(error = %err, "Upstream dial failed");
                    addr.do_send(UpstreamDialFailed { message: err });
                }
            }
        });
    }

    /// Validate one audio chunk and forward it upstream.
    fn handle_audio_chunk(&mut self, data: String, ctx: &mut ws::WebsocketContext<Self>) {
        let session = match &self.session {
            Some(session) => session.clone(),
            None => {
                self.send_error(ctx, "session_error", "No active session, send start_session first");
                return;
            }
        };

        if !session.can_accept_audio() {
            self.send_error(
                ctx,
                "session_error",
                &format!("Session is {}, cannot accept audio", session.status().as_str()),
            );
            return;
        }

        // Validate at the boundary: decodable base64, whole 16-bit samples
        if let Err(err) = pcm::decode_chunk(&data) {
            self.send_error(ctx, "invalid_frame", &format!("Invalid audio chunk: {}", err));
            return;
        }

        let upstream = match &self.upstream {
            Some(upstream) => upstream,
            None => {
                self.send_error(ctx, "session_error", "Upstream connection not ready");
                return;
            }
        };

        if let Err(err) = upstream.send_audio(data) {
            self.send_error(ctx, "upstream_error", &err);
            return;
        }

        // First accepted chunk moves the session to Streaming
        let _ = session.mark_streaming();
        session.record_chunk_upstream();
    }

    fn handle_stop_session(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        match &self.upstream {
            Some(upstream) => {
                info!("Client requested stop, closing upstream leg");
                upstream.stop();
                // The close completes when Disconnected{clean} comes back
            }
            None => {
                // Nothing upstream to wind down
                self.teardown();
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Normal)));
                ctx.stop();
            }
        }
    }

    /// Relay one upstream event to the browser.
    fn handle_upstream_event(&mut self, event: UpstreamEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match event {
            UpstreamEvent::Frame(frame) => {
                if let Some(session) = &self.session {
                    match &frame {
                        ServerFrame::SessionStarted { .. } => {
                            let _ = session.mark_open();
                            // The browser sees the relay's session id, not the
                            // upstream's internal one
                            self.send_frame(
                                ctx,
                                &ServerFrame::SessionStarted {
                                    session_id: session.session_id.clone(),
                                },
                            );
                            info!(session_id = %session.session_id, "Relay session open");
                            return;
                        }
                        ServerFrame::Ping { .. } => {
                            // Upstream heartbeats are not relayed; each leg
                            // runs its own
                            return;
                        }
                        _ => {
                            session.record_event_downstream();
                        }
                    }
                }
                self.send_frame(ctx, &frame);
            }
            UpstreamEvent::Reconnecting { attempt } => {
                warn!(attempt = attempt, "Upstream connection lost, reconnecting");
                if let Some(session) = &self.session {
                    let _ = session.begin_reconnecting();
                }
            }
            UpstreamEvent::Disconnected { clean } => {
                if !clean {
                    self.send_error(
                        ctx,
                        "upstream_disconnected",
                        "Upstream connection lost and could not be re-established",
                    );
                }
                self.teardown();
                ctx.close(Some(ws::CloseReason::from(if clean {
                    ws::CloseCode::Normal
                } else {
                    ws::CloseCode::Error
                })));
                ctx.stop();
            }
        }
    }

    /// Close the session and release its registry slot and gauge count.
    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
            let stats = session.stats();
            info!(
                session_id = %session.session_id,
                chunks_upstream = stats.chunks_upstream,
                events_downstream = stats.events_downstream,
                reconnects = stats.reconnect_attempts,
                "Relay session closed"
            );
            self.session_manager.remove_session(&session.session_id);
        }
        if self.counted {
            self.app_state.decrement_active_sessions();
            self.counted = false;
        }
        self.upstream = None;
    }
}

/// The upstream dial succeeded; the actor takes ownership of the handle.
#[derive(Message)]
#[rtype(result = "()")]
struct UpstreamConnected {
    handle: UpstreamHandle,
}

/// The initial upstream dial failed.
#[derive(Message)]
#[rtype(result = "()")]
struct UpstreamDialFailed {
    message: String,
}

/// An event from the upstream connection task.
#[derive(Message)]
#[rtype(result = "()")]
struct UpstreamEventMsg(UpstreamEvent);

impl Actor for AudioRelaySocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Realtime analysis WebSocket connected");

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("WebSocket heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }

            let ping = ServerFrame::Ping {
                timestamp: chrono::Utc::now().timestamp_millis() as u64,
            };
            act.send_frame(ctx, &ping);
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Browser went away without stop_session: kill the upstream task
        if let Some(upstream) = &self.upstream {
            upstream.abort();
        }
        self.teardown();
        info!("Realtime analysis WebSocket disconnected");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for AudioRelaySocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(ClientFrame::StartSession {
                    language,
                    model,
                    sample_rate,
                }) => {
                    self.handle_start_session(
                        SessionParams {
                            language,
                            model,
                            sample_rate,
                        },
                        ctx,
                    );
                }
                Ok(ClientFrame::AudioChunk { data, .. }) => {
                    self.handle_audio_chunk(data, ctx);
                }
                Ok(ClientFrame::StopSession) => {
                    self.handle_stop_session(ctx);
                }
                Ok(ClientFrame::Pong { .. }) => {
                    self.last_heartbeat = Instant::now();
                }
                Err(err) => {
                    // Unrecognized frames are rejected, never silently dropped
                    self.send_error(ctx, "invalid_frame", &format!("Unrecognized frame: {}", err));
                }
            },
            Ok(ws::Message::Binary(_)) => {
                // Audio travels as base64 inside JSON frames on this protocol
                self.send_error(ctx, "invalid_frame", "Binary frames are not supported");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed by client: {:?}", reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(error = %err, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

impl Handler<UpstreamConnected> for AudioRelaySocket {
    type Result = ();

    fn handle(&mut self, msg: UpstreamConnected, _ctx: &mut Self::Context) {
        debug!("Upstream connection handle received");
        self.upstream = Some(msg.handle);
    }
}

impl Handler<UpstreamDialFailed> for AudioRelaySocket {
    type Result = ();

    fn handle(&mut self, msg: UpstreamDialFailed, ctx: &mut Self::Context) {
        self.send_error(ctx, "upstream_unavailable", &msg.message);
        self.teardown();
        ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Error)));
        ctx.stop();
    }
}

impl Handler<UpstreamEventMsg> for AudioRelaySocket {
    type Result = ();

    fn handle(&mut self, msg: UpstreamEventMsg, ctx: &mut Self::Context) {
        self.handle_upstream_event(msg.0, ctx);
    }
}

/// WebSocket endpoint handler.
///
/// ## HTTP to WebSocket Upgrade:
/// Authenticates the upgrade request (401 before any upstream work), then
/// hands the connection to an `AudioRelaySocket` actor.
pub async fn realtime_analysis(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
    session_manager: web::Data<SessionManager>,
) -> ActixResult<HttpResponse> {
    let user = crate::auth::authenticate(&req, &app_state)?;

    info!(
        user_id = %user.user_id,
        peer = ?req.connection_info().peer_addr(),
        "New realtime analysis connection"
    );

    let socket = AudioRelaySocket::new(app_state, session_manager.into_inner());
    ws::start(socket, &req, stream)
}
