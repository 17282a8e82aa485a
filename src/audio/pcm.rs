//! # PCM Wire Codec
//!
//! Conversion and validation for the audio that crosses the WebSocket
//! boundary: microphone captures arrive as Float32 at arbitrary sample rates
//! and must leave as base64-encoded 16kHz mono Int16 little-endian PCM in
//! fixed 4096-sample frames. Audio coming back from the speech API travels
//! the same wire format in reverse.

use base64::prelude::*;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Decode a base64 `audio_chunk` payload into 16-bit samples.
///
/// ## Validation:
/// - payload must decode as base64
/// - byte length must be even (16-bit alignment)
/// - must contain at least one sample
pub fn decode_chunk(payload: &str) -> Result<Vec<i16>, String> {
    let bytes = BASE64_STANDARD
        .decode(payload)
        .map_err(|e| format!("Invalid base64 audio payload: {}", e))?;

    if bytes.is_empty() {
        return Err("No audio data provided".to_string());
    }
    if bytes.len() % 2 != 0 {
        return Err("Audio data length must be even for 16-bit samples".to_string());
    }

    let mut cursor = Cursor::new(bytes.as_slice());
    let mut samples = Vec::with_capacity(bytes.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample);
    }

    Ok(samples)
}

/// Encode 16-bit samples as a base64 payload for the wire.
pub fn encode_chunk(samples: &[i16]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        // Writing into a Vec cannot fail
        bytes.write_i16::<LittleEndian>(sample).unwrap();
    }
    BASE64_STANDARD.encode(bytes)
}

/// Convert 32-bit float samples ([-1.0, 1.0]) to 16-bit PCM.
pub fn float_to_pcm(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let scaled = sample * 32768.0;
            scaled.clamp(-32768.0, 32767.0) as i16
        })
        .collect()
}

/// Convert 16-bit PCM samples to 32-bit floats ([-1.0, 1.0]).
pub fn pcm_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&sample| sample as f32 / 32768.0).collect()
}

/// Downmix interleaved multi-channel audio to mono by averaging channels.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample mono audio to a target rate using linear interpolation.
///
/// Good enough for speech being fed to a transcription API; this is not a
/// band-limited resampler.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;

        let current = samples[idx];
        let next = if idx + 1 < samples.len() {
            samples[idx + 1]
        } else {
            current
        };

        out.push(current + (next - current) * frac);
    }

    out
}

/// Accumulates samples and emits fixed-size frames for the wire.
///
/// The capture callback delivers buffers of whatever size the audio stack
/// chooses; the protocol wants exactly `chunk_size` samples per
/// `audio_chunk` frame. Leftover samples stay pending until the next push
/// or an explicit flush.
#[derive(Debug)]
pub struct ChunkFramer {
    chunk_size: usize,
    pending: Vec<i16>,
}

impl ChunkFramer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            pending: Vec::with_capacity(chunk_size),
        }
    }

    /// Add samples; returns every complete frame now available.
    pub fn push(&mut self, samples: &[i16]) -> Vec<Vec<i16>> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.chunk_size {
            let frame: Vec<i16> = self.pending.drain(..self.chunk_size).collect();
            frames.push(frame);
        }
        frames
    }

    /// Take whatever is pending as a final short frame (end of recording).
    pub fn flush(&mut self) -> Option<Vec<i16>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_round_trip() {
        let samples = vec![0i16, 16384, -16384, 32767, -32768];
        let encoded = encode_chunk(&samples);
        let decoded = decode_chunk(&encoded).unwrap();
        assert_eq!(samples, decoded);
    }

    #[test]
    fn test_decode_rejects_bad_payloads() {
        assert!(decode_chunk("not base64!!!").is_err());
        // Odd byte count: 3 bytes
        let odd = BASE64_STANDARD.encode([1u8, 2, 3]);
        assert!(decode_chunk(&odd).is_err());
        // Empty payload
        assert!(decode_chunk("").is_err());
    }

    #[test]
    fn test_float_pcm_conversion_accuracy() {
        let pcm = vec![0i16, 16384, -16384, 32767, -32768];
        let floats = pcm_to_float(&pcm);
        let back = float_to_pcm(&floats);

        for (original, converted) in pcm.iter().zip(back.iter()) {
            let diff = (*original as i32 - *converted as i32).abs();
            assert!(diff <= 1, "Conversion error too large: {} vs {}", original, converted);
        }
    }

    #[test]
    fn test_downmix_averages_channels() {
        // Two interleaved stereo frames: (0.2, 0.4) and (-1.0, 1.0)
        let stereo = vec![0.2, 0.4, -1.0, 1.0];
        let mono = downmix_to_mono(&stereo, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
    }

    #[test]
    fn test_resample_halves_48k_to_16k() {
        let input: Vec<f32> = (0..480).map(|i| (i as f32 / 480.0).sin()).collect();
        let output = resample_linear(&input, 48000, 16000);
        assert_eq!(output.len(), 160);
        // Endpoints should be close to the source signal
        assert!((output[0] - input[0]).abs() < 1e-3);
    }

    #[test]
    fn test_resample_identity() {
        let input = vec![0.1f32, 0.2, 0.3];
        assert_eq!(resample_linear(&input, 16000, 16000), input);
    }

    #[test]
    fn test_framer_emits_fixed_frames() {
        let mut framer = ChunkFramer::new(4);

        assert!(framer.push(&[1, 2, 3]).is_empty());
        assert_eq!(framer.pending_len(), 3);

        let frames = framer.push(&[4, 5, 6, 7, 8, 9]);
        assert_eq!(frames, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        assert_eq!(framer.pending_len(), 1);

        assert_eq!(framer.flush(), Some(vec![9]));
        assert_eq!(framer.flush(), None);
    }
}
