//! # Audio Pipeline Module
//!
//! Audio-side building blocks for the realtime relay.
//!
//! ## Key Components:
//! - **PCM codec** (`pcm`): Float32→Int16 conversion, 16kHz mono resampling,
//!   4096-sample chunk framing, base64 wire encoding, format validation
//! - **Playback scheduler** (`playback`): software jitter buffer that lines up
//!   returned audio chunks back-to-back on an audio clock
//! - **Session management** (`session`): relay session state machine and the
//!   manager that enforces the concurrent-session cap
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers, base64 on the wire

pub mod pcm;
pub mod playback;
pub mod session;
