//! # Upstream Realtime Connection
//!
//! The relay's client leg: one WebSocket to the external real-time speech API
//! per session. The connection runs as a spawned task that owns the socket;
//! the browser-facing actor talks to it through channels:
//!
//! - **commands in**: audio chunks to forward, or a stop request
//! - **events out**: frames relayed from the upstream, plus connection
//!   lifecycle notices (reconnecting, disconnected)
//!
//! ## Failure semantics:
//! A non-clean close or transport error triggers the fixed-delay, capped
//! reconnect policy; after a successful re-dial the session-start frame is
//! sent again so the upstream re-establishes context. An intentional stop
//! (client pressed stop, or the far end closed with code 1000) never
//! reconnects.

use crate::audio::session::SessionParams;
use crate::relay::protocol::{ClientFrame, ServerFrame};
use crate::relay::reconnect::{ReconnectDecision, ReconnectPolicy, CLOSE_NORMAL};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Commands the browser-facing side sends to the connection task.
#[derive(Debug)]
pub enum UpstreamCommand {
    /// Forward one base64 PCM chunk upstream
    Audio { data: String },
    /// Intentional stop: send stop_session, close cleanly, no reconnect
    Stop,
}

/// Events the connection task reports back.
#[derive(Debug)]
pub enum UpstreamEvent {
    /// A frame relayed verbatim from the upstream
    Frame(ServerFrame),
    /// Connection lost; a reconnect attempt is scheduled
    Reconnecting { attempt: u32 },
    /// Connection is gone for good. `clean` distinguishes an intentional
    /// stop from an exhausted reconnect policy.
    Disconnected { clean: bool },
}

/// Handle to a running upstream connection.
pub struct UpstreamHandle {
    command_tx: mpsc::UnboundedSender<UpstreamCommand>,
    intentional: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl UpstreamHandle {
    /// Dial the upstream speech API, send the session-start frame, and spawn
    /// the connection task.
    ///
    /// ## Returns:
    /// The handle plus the event receiver the caller drains.
    pub async fn connect(
        url: String,
        params: SessionParams,
        policy: ReconnectPolicy,
    ) -> Result<(Self, mpsc::UnboundedReceiver<UpstreamEvent>), String> {
        // Fail fast on malformed configuration instead of inside the task
        url::Url::parse(&url).map_err(|e| format!("Invalid upstream URL '{}': {}", url, e))?;

        let ws = dial(&url, &params).await?;
        info!(url = %url, "Upstream realtime connection established");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let intentional = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_connection(
            ws,
            url,
            params,
            policy,
            command_rx,
            event_tx,
            intentional.clone(),
        ));

        Ok((
            Self {
                command_tx,
                intentional,
                task,
            },
            event_rx,
        ))
    }

    /// Queue one audio chunk for the upstream. Non-blocking so it can be
    /// called from the actor's synchronous message handler.
    pub fn send_audio(&self, data: String) -> Result<(), String> {
        self.command_tx
            .send(UpstreamCommand::Audio { data })
            .map_err(|_| "Upstream connection task has exited".to_string())
    }

    /// Request an intentional stop. Suppresses reconnection before the close
    /// races the reader.
    pub fn stop(&self) {
        self.intentional.store(true, Ordering::SeqCst);
        // If the task already exited there is nothing left to stop
        let _ = self.command_tx.send(UpstreamCommand::Stop);
    }

    /// Abort the connection task outright (actor dropped without a stop).
    pub fn abort(&self) {
        self.intentional.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

/// Open the socket and send the session-start frame.
async fn dial(url: &str, params: &SessionParams) -> Result<WsStream, String> {
    let (mut ws, _) = connect_async(url)
        .await
        .map_err(|e| format!("Failed to connect upstream: {}", e))?;

    let start = ClientFrame::StartSession {
        language: params.language.clone(),
        model: params.model.clone(),
        sample_rate: params.sample_rate,
    };
    let json = serde_json::to_string(&start)
        .map_err(|e| format!("Failed to encode start_session: {}", e))?;

    ws.send(Message::Text(json))
        .await
        .map_err(|e| format!("Failed to send start_session: {}", e))?;

    Ok(ws)
}

/// Why the current socket stopped being usable.
enum ConnectionLoss {
    /// Far end sent a close frame (with its code) or the stream ended
    Closed(Option<u16>),
    /// Intentional stop requested from our side
    Stopped,
}

/// The connection task: pump commands up and frames down until the socket
/// dies, then apply the reconnect policy.
async fn run_connection(
    mut ws: WsStream,
    url: String,
    params: SessionParams,
    policy: ReconnectPolicy,
    mut command_rx: mpsc::UnboundedReceiver<UpstreamCommand>,
    event_tx: mpsc::UnboundedSender<UpstreamEvent>,
    intentional: Arc<AtomicBool>,
) {
    let mut attempts: u32 = 0;

    loop {
        let loss = pump(&mut ws, &mut command_rx, &event_tx).await;

        match loss {
            ConnectionLoss::Stopped => {
                // Send a best-effort clean close; the far end may already be gone
                let _ = ws.close(None).await;
                let _ = event_tx.send(UpstreamEvent::Disconnected { clean: true });
                return;
            }
            ConnectionLoss::Closed(code) => {
                if intentional.load(Ordering::SeqCst) || code == Some(CLOSE_NORMAL) {
                    debug!(close_code = ?code, "Upstream closed cleanly, not reconnecting");
                    let _ = event_tx.send(UpstreamEvent::Disconnected { clean: true });
                    return;
                }

                // Non-clean loss: keep applying the policy until we are back
                // on a socket or out of attempts
                match reconnect(&url, &params, policy, &mut attempts, code, &event_tx).await {
                    Some(new_ws) => {
                        ws = new_ws;
                        info!(attempt = attempts, "Upstream reconnect succeeded");
                    }
                    None => {
                        warn!(attempts = attempts, "Upstream reconnect attempts exhausted");
                        let _ = event_tx.send(UpstreamEvent::Disconnected { clean: false });
                        return;
                    }
                }
            }
        }
    }
}

/// Relay traffic in both directions until the connection is lost.
async fn pump(
    ws: &mut WsStream,
    command_rx: &mut mpsc::UnboundedReceiver<UpstreamCommand>,
    event_tx: &mpsc::UnboundedSender<UpstreamEvent>,
) -> ConnectionLoss {
    loop {
        tokio::select! {
            command = command_rx.recv() => {
                match command {
                    Some(UpstreamCommand::Audio { data }) => {
                        let frame = ClientFrame::AudioChunk { data, timestamp: 0 };
                        // Serializing a frame we just built cannot fail
                        let json = serde_json::to_string(&frame).unwrap();
                        if let Err(e) = ws.send(Message::Text(json)).await {
                            warn!(error = %e, "Failed to forward audio chunk upstream");
                            return ConnectionLoss::Closed(None);
                        }
                    }
                    Some(UpstreamCommand::Stop) => {
                        let json = serde_json::to_string(&ClientFrame::StopSession).unwrap();
                        let _ = ws.send(Message::Text(json)).await;
                        return ConnectionLoss::Stopped;
                    }
                    // Handle dropped without an explicit stop
                    None => return ConnectionLoss::Stopped,
                }
            }
            message = ws.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerFrame>(&text) {
                            Ok(frame) => {
                                if event_tx.send(UpstreamEvent::Frame(frame)).is_err() {
                                    // Receiver gone: the actor stopped
                                    return ConnectionLoss::Stopped;
                                }
                            }
                            Err(e) => {
                                // Reject-at-boundary: an upstream frame we don't
                                // recognize is surfaced, not dropped
                                warn!(error = %e, "Unrecognized frame from upstream");
                                let _ = event_tx.send(UpstreamEvent::Frame(ServerFrame::error(
                                    "invalid_upstream_frame",
                                    format!("Unrecognized frame from upstream: {}", e),
                                )));
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = ws.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|f| u16::from(f.code));
                        return ConnectionLoss::Closed(code);
                    }
                    Some(Ok(_)) => {
                        // Binary/pong frames are not part of this protocol
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Upstream WebSocket error");
                        return ConnectionLoss::Closed(None);
                    }
                    None => return ConnectionLoss::Closed(None),
                }
            }
        }
    }
}

/// Apply the reconnect policy until a dial succeeds or the policy gives up.
async fn reconnect(
    url: &str,
    params: &SessionParams,
    policy: ReconnectPolicy,
    attempts: &mut u32,
    first_close_code: Option<u16>,
    event_tx: &mpsc::UnboundedSender<UpstreamEvent>,
) -> Option<WsStream> {
    let mut close_code = first_close_code;

    loop {
        match policy.decide(close_code, *attempts) {
            ReconnectDecision::GiveUp => return None,
            ReconnectDecision::Retry { after } => {
                *attempts += 1;
                let _ = event_tx.send(UpstreamEvent::Reconnecting { attempt: *attempts });
                debug!(attempt = *attempts, delay_ms = after.as_millis() as u64, "Scheduling upstream reconnect");
                tokio::time::sleep(after).await;

                match dial(url, params).await {
                    Ok(ws) => return Some(ws),
                    Err(e) => {
                        warn!(attempt = *attempts, error = %e, "Upstream reconnect attempt failed");
                        // A failed dial has no close code
                        close_code = None;
                    }
                }
            }
        }
    }
}
