//! # Message Analysis Relay
//!
//! Everything behind the `/api/analyze-message` and `/api/preview-message`
//! endpoints: the typed payloads exchanged with the upstream LLM analysis
//! service, the HTTP client that forwards requests to it, and the merge logic
//! that combines a policy check with an analysis into one preview response.
//!
//! The relay performs no independent computation on message content. Its job
//! is shaping: forward the request, pass a successful body through unchanged,
//! and substitute the fixed fallback when the upstream fails.

pub mod client;
pub mod preview;
pub mod types;

pub use client::AnalysisClient;
pub use types::{AnalysisResult, MessageRequest, PreviewRequest};
