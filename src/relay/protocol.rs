//! # Relay Control Frames
//!
//! The JSON frames spoken over the realtime WebSocket, as closed tagged
//! enums. The same protocol runs on both legs of the relay: browser ↔ relay
//! and relay ↔ upstream speech API.
//!
//! ## Boundary policy:
//! Frames are validated at the boundary and the sender of a bad one gets a
//! `session_error` back. Both the `type` discriminator and the field set are
//! closed: an unknown `type` fails to decode, and so does a known frame
//! carrying fields outside its variant. Serde ignores `deny_unknown_fields`
//! on internally tagged enums, so decoding is written out by hand: the tag is
//! split off and the remaining object is decoded into a per-variant struct
//! that does enforce it.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Frames sent by the audio client (and forwarded by the relay upstream).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Open an analysis session on the speech API
    #[serde(rename = "start_session")]
    StartSession {
        language: String,
        model: String,
        sample_rate: u32,
    },

    /// One frame of microphone audio: base64-encoded 16-bit PCM
    #[serde(rename = "audio_chunk")]
    AudioChunk {
        data: String,
        /// Capture timestamp in milliseconds
        timestamp: u64,
    },

    /// Intentional stop; the relay closes the upstream leg cleanly
    #[serde(rename = "stop_session")]
    StopSession,

    /// Heartbeat response
    #[serde(rename = "pong")]
    Pong { timestamp: u64 },
}

/// Frames sent to the audio client (originating here or relayed from the
/// upstream speech API).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// The upstream accepted the session
    #[serde(rename = "session_started")]
    SessionStarted { session_id: String },

    /// A complete AI audio response: base64-encoded 16-bit PCM to play back
    #[serde(rename = "ai_audio_response")]
    AiAudioResponse { data: String },

    /// A streaming AI audio fragment (same wire format, scheduled
    /// back-to-back by the playback side)
    #[serde(rename = "ai_audio_stream")]
    AiAudioStream { data: String },

    /// Transcription of the user's speech
    #[serde(rename = "transcription")]
    Transcription { text: String, is_final: bool },

    /// Session-level failure (auth, capacity, upstream loss, bad frames)
    #[serde(rename = "session_error")]
    SessionError { code: String, message: String },

    /// Heartbeat probe
    #[serde(rename = "ping")]
    Ping { timestamp: u64 },
}

impl ServerFrame {
    /// Shorthand for error frames.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerFrame::SessionError {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

const CLIENT_FRAME_TYPES: &[&str] = &["start_session", "audio_chunk", "stop_session", "pong"];

const SERVER_FRAME_TYPES: &[&str] = &[
    "session_started",
    "ai_audio_response",
    "ai_audio_stream",
    "transcription",
    "session_error",
    "ping",
];

/// Remove and return the `type` discriminator, leaving only the payload.
fn take_tag(value: &mut serde_json::Value) -> Result<String, String> {
    let object = value
        .as_object_mut()
        .ok_or_else(|| "frame must be a JSON object".to_string())?;

    match object.remove("type") {
        Some(serde_json::Value::String(tag)) => Ok(tag),
        Some(_) => Err("frame `type` must be a string".to_string()),
        None => Err("missing frame `type`".to_string()),
    }
}

// Per-variant field sets. These are what make the wire format closed:
// serde enforces deny_unknown_fields on plain structs, just not through an
// internally tagged enum.

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StartSessionFields {
    language: String,
    model: String,
    sample_rate: u32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AudioChunkFields {
    data: String,
    #[serde(default)]
    timestamp: u64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoFields {}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct HeartbeatFields {
    #[serde(default)]
    timestamp: u64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionStartedFields {
    session_id: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AudioPayloadFields {
    data: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TranscriptionFields {
    text: String,
    is_final: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionErrorFields {
    code: String,
    message: String,
}

impl<'de> Deserialize<'de> for ClientFrame {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut value = serde_json::Value::deserialize(deserializer)?;
        let tag = take_tag(&mut value).map_err(de::Error::custom)?;

        let frame = match tag.as_str() {
            "start_session" => serde_json::from_value::<StartSessionFields>(value).map(|f| {
                ClientFrame::StartSession {
                    language: f.language,
                    model: f.model,
                    sample_rate: f.sample_rate,
                }
            }),
            "audio_chunk" => {
                serde_json::from_value::<AudioChunkFields>(value).map(|f| ClientFrame::AudioChunk {
                    data: f.data,
                    timestamp: f.timestamp,
                })
            }
            "stop_session" => {
                serde_json::from_value::<NoFields>(value).map(|_| ClientFrame::StopSession)
            }
            "pong" => serde_json::from_value::<HeartbeatFields>(value)
                .map(|f| ClientFrame::Pong { timestamp: f.timestamp }),
            other => return Err(de::Error::unknown_variant(other, CLIENT_FRAME_TYPES)),
        };

        frame.map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for ServerFrame {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut value = serde_json::Value::deserialize(deserializer)?;
        let tag = take_tag(&mut value).map_err(de::Error::custom)?;

        let frame = match tag.as_str() {
            "session_started" => serde_json::from_value::<SessionStartedFields>(value).map(|f| {
                ServerFrame::SessionStarted {
                    session_id: f.session_id,
                }
            }),
            "ai_audio_response" => serde_json::from_value::<AudioPayloadFields>(value)
                .map(|f| ServerFrame::AiAudioResponse { data: f.data }),
            "ai_audio_stream" => serde_json::from_value::<AudioPayloadFields>(value)
                .map(|f| ServerFrame::AiAudioStream { data: f.data }),
            "transcription" => serde_json::from_value::<TranscriptionFields>(value).map(|f| {
                ServerFrame::Transcription {
                    text: f.text,
                    is_final: f.is_final,
                }
            }),
            "session_error" => serde_json::from_value::<SessionErrorFields>(value).map(|f| {
                ServerFrame::SessionError {
                    code: f.code,
                    message: f.message,
                }
            }),
            "ping" => serde_json::from_value::<HeartbeatFields>(value)
                .map(|f| ServerFrame::Ping { timestamp: f.timestamp }),
            other => return Err(de::Error::unknown_variant(other, SERVER_FRAME_TYPES)),
        };

        frame.map_err(de::Error::custom)
    }
}
