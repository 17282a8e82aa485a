//! # Relay Session Management
//!
//! Tracks the lifecycle of audio relay sessions and enforces the concurrent
//! session cap. Each session represents one browser WebSocket connection and
//! its paired upstream speech-API connection.
//!
//! ## Session Lifecycle:
//! 1. **Idle**: session registered, upstream not yet dialed
//! 2. **Connecting**: upstream WebSocket being established
//! 3. **Open**: upstream confirmed the session start
//! 4. **Streaming**: audio chunks flowing
//! 5. **Closed**: stopped by the client or torn down after a failure

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Current status of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Open,
    Streaming,
    Closed,
}

impl SessionStatus {
    /// Status string for WebSocket frames and the health endpoint.
    pub fn as_str(&self) -> &str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Open => "open",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Closed => "closed",
        }
    }
}

/// Parameters a client supplies when starting a session.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub language: String,
    pub model: String,
    pub sample_rate: u32,
}

/// One audio relay session.
///
/// ## Thread Safety:
/// Status and counters sit behind RwLocks so the WebSocket actor and the
/// upstream reader task can both touch the session.
#[derive(Debug)]
pub struct RelaySession {
    /// Unique identifier for this session
    pub session_id: String,

    /// Parameters the client started the session with
    pub params: SessionParams,

    /// Current session status
    status: Arc<RwLock<SessionStatus>>,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// Traffic counters
    stats: Arc<RwLock<SessionStats>>,
}

/// Per-session traffic counters.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Audio chunks relayed from the client to the upstream
    pub chunks_upstream: u64,

    /// Audio/transcription events relayed from the upstream to the client
    pub events_downstream: u64,

    /// Upstream reconnect attempts made during this session
    pub reconnect_attempts: u32,
}

impl RelaySession {
    pub fn new(session_id: String, params: SessionParams) -> Self {
        Self {
            session_id,
            params,
            status: Arc::new(RwLock::new(SessionStatus::Idle)),
            created_at: Utc::now(),
            stats: Arc::new(RwLock::new(SessionStats::default())),
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.read().unwrap()
    }

    /// Idle → Connecting: the upstream socket is being dialed.
    pub fn begin_connecting(&self) -> Result<(), String> {
        self.transition(SessionStatus::Connecting, &[SessionStatus::Idle])
    }

    /// Connecting → Open: the upstream confirmed session start.
    pub fn mark_open(&self) -> Result<(), String> {
        self.transition(SessionStatus::Open, &[SessionStatus::Connecting])
    }

    /// Open → Streaming: first audio chunk accepted. Idempotent while
    /// streaming continues.
    pub fn mark_streaming(&self) -> Result<(), String> {
        let current = self.status();
        if current == SessionStatus::Streaming {
            return Ok(());
        }
        self.transition(SessionStatus::Streaming, &[SessionStatus::Open])
    }

    /// A reconnect puts the session back into Connecting until the upstream
    /// confirms again.
    pub fn begin_reconnecting(&self) -> Result<(), String> {
        self.stats.write().unwrap().reconnect_attempts += 1;
        self.transition(
            SessionStatus::Connecting,
            &[SessionStatus::Open, SessionStatus::Streaming],
        )
    }

    /// Any state → Closed. Closing twice is allowed.
    pub fn close(&self) {
        *self.status.write().unwrap() = SessionStatus::Closed;
    }

    /// Whether the session can relay audio chunks right now.
    pub fn can_accept_audio(&self) -> bool {
        matches!(self.status(), SessionStatus::Open | SessionStatus::Streaming)
    }

    pub fn record_chunk_upstream(&self) {
        self.stats.write().unwrap().chunks_upstream += 1;
    }

    pub fn record_event_downstream(&self) {
        self.stats.write().unwrap().events_downstream += 1;
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.read().unwrap().clone()
    }

    /// Session age in seconds.
    pub fn age_seconds(&self) -> i64 {
        Utc::now().signed_duration_since(self.created_at).num_seconds()
    }

    fn transition(&self, to: SessionStatus, allowed_from: &[SessionStatus]) -> Result<(), String> {
        let mut status = self.status.write().unwrap();
        if !allowed_from.contains(&status) {
            return Err(format!(
                "Invalid session transition: {} -> {}",
                status.as_str(),
                to.as_str()
            ));
        }
        *status = to;
        Ok(())
    }
}

/// Manages the concurrent relay sessions.
///
/// ## Resource Management:
/// - Enforces the maximum concurrent session limit
/// - Sessions are removed explicitly on close; stale ones can be swept by age
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Arc<RelaySession>>>>,
    max_concurrent_sessions: usize,
}

impl SessionManager {
    pub fn new(max_concurrent_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_concurrent_sessions,
        }
    }

    /// Register a new session.
    ///
    /// ## Returns:
    /// - **Ok(session)**: registered, still Idle
    /// - **Err(message)**: at capacity or duplicate id
    pub fn create_session(
        &self,
        session_id: Option<String>,
        params: SessionParams,
    ) -> Result<Arc<RelaySession>, String> {
        let mut sessions = self.sessions.write().unwrap();

        if sessions.len() >= self.max_concurrent_sessions {
            return Err(format!(
                "Maximum concurrent sessions ({}) reached",
                self.max_concurrent_sessions
            ));
        }

        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        if sessions.contains_key(&session_id) {
            return Err(format!("Session ID '{}' already exists", session_id));
        }

        let session = Arc::new(RelaySession::new(session_id.clone(), params));
        sessions.insert(session_id, session.clone());

        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> Option<Arc<RelaySession>> {
        self.sessions.read().unwrap().get(session_id).cloned()
    }

    /// Remove a session (cleanup when closed or failed).
    pub fn remove_session(&self, session_id: &str) -> bool {
        self.sessions.write().unwrap().remove(session_id).is_some()
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Sweep sessions that are Closed or older than `max_age_seconds`.
    pub fn cleanup_stale_sessions(&self, max_age_seconds: i64) -> usize {
        let mut sessions = self.sessions.write().unwrap();

        let to_remove: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| {
                session.status() == SessionStatus::Closed
                    || session.age_seconds() > max_age_seconds
            })
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in &to_remove {
            sessions.remove(session_id);
        }

        to_remove.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SessionParams {
        SessionParams {
            language: "ja-JP".to_string(),
            model: "default".to_string(),
            sample_rate: 16000,
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let session = RelaySession::new("s1".to_string(), params());
        assert_eq!(session.status(), SessionStatus::Idle);

        session.begin_connecting().unwrap();
        session.mark_open().unwrap();
        assert!(session.can_accept_audio());

        session.mark_streaming().unwrap();
        // Streaming is idempotent
        session.mark_streaming().unwrap();
        assert_eq!(session.status(), SessionStatus::Streaming);

        session.close();
        assert_eq!(session.status(), SessionStatus::Closed);
        assert!(!session.can_accept_audio());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let session = RelaySession::new("s1".to_string(), params());

        // Cannot open before connecting
        assert!(session.mark_open().is_err());
        // Cannot stream before open
        assert!(session.mark_streaming().is_err());

        session.close();
        // Closed sessions stay closed
        assert!(session.begin_connecting().is_err());
    }

    #[test]
    fn test_reconnect_transition() {
        let session = RelaySession::new("s1".to_string(), params());
        session.begin_connecting().unwrap();
        session.mark_open().unwrap();
        session.mark_streaming().unwrap();

        session.begin_reconnecting().unwrap();
        assert_eq!(session.status(), SessionStatus::Connecting);
        assert_eq!(session.stats().reconnect_attempts, 1);

        session.mark_open().unwrap();
        assert!(session.can_accept_audio());
    }

    #[test]
    fn test_session_limit_enforced() {
        let manager = SessionManager::new(2);
        manager.create_session(None, params()).unwrap();
        manager.create_session(None, params()).unwrap();

        let err = manager.create_session(None, params()).unwrap_err();
        assert!(err.contains("Maximum concurrent sessions"));
    }

    #[test]
    fn test_duplicate_session_id_rejected() {
        let manager = SessionManager::new(5);
        manager
            .create_session(Some("dup".to_string()), params())
            .unwrap();
        assert!(manager
            .create_session(Some("dup".to_string()), params())
            .is_err());
    }

    #[test]
    fn test_cleanup_removes_closed_sessions() {
        let manager = SessionManager::new(5);
        let session = manager
            .create_session(Some("s1".to_string()), params())
            .unwrap();
        manager.create_session(Some("s2".to_string()), params()).unwrap();

        session.close();
        let removed = manager.cleanup_stale_sessions(3600);
        assert_eq!(removed, 1);
        assert_eq!(manager.active_session_count(), 1);
        assert!(manager.get_session("s1").is_none());
    }
}
