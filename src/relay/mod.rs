//! # Realtime Relay Module
//!
//! The WebSocket side of the guardrail: the typed control-frame protocol
//! spoken on both legs of the relay, the reconnect policy for the upstream
//! speech socket, and the upstream connection itself.

pub mod protocol;
pub mod reconnect;
pub mod upstream;
