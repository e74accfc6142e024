//! Audio payloads and the PCM container wrapper.
//!
//! Uploaded clips arrive in a self-describing container and are used as-is.
//! Generated speech arrives as base64-encoded headerless PCM; [`wrap_pcm`]
//! prefixes it with a canonical 44-byte RIFF/WAVE header so the decoder can
//! treat both paths identically.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::playback::constants::{
    GENERATED_BITS_PER_SAMPLE, GENERATED_CHANNELS, GENERATED_SAMPLE_RATE,
};
use crate::playback::errors::DecodeError;

/// Size of the header written by [`wrap_pcm`].
pub const WAV_HEADER_LEN: usize = 44;

/// Immutable encoded audio, cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    bytes: Arc<[u8]>,
}

impl AudioPayload {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Builds a payload from the speech generator's base64 PCM.
    pub fn from_generated_base64(encoded: &str) -> Result<Self, DecodeError> {
        let raw = BASE64.decode(encoded.trim())?;
        Ok(wrap_pcm(&raw, PcmFormat::GENERATED_SPEECH))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

impl From<Vec<u8>> for AudioPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for AudioPayload {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

/// Layout of headerless integer PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// What the speech generator returns.
    pub const GENERATED_SPEECH: Self = Self {
        sample_rate: GENERATED_SAMPLE_RATE,
        channels: GENERATED_CHANNELS,
        bits_per_sample: GENERATED_BITS_PER_SAMPLE,
    };

    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }
}

/// Prefixes raw PCM bytes with a RIFF/WAVE header describing `format`.
///
/// All header fields are little-endian. The data bytes are copied verbatim
/// after the header.
pub fn wrap_pcm(raw: &[u8], format: PcmFormat) -> AudioPayload {
    let data_len = raw.len() as u32;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + raw.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&format.channels.to_le_bytes());
    out.extend_from_slice(&format.sample_rate.to_le_bytes());
    out.extend_from_slice(&format.byte_rate().to_le_bytes());
    out.extend_from_slice(&format.block_align().to_le_bytes());
    out.extend_from_slice(&format.bits_per_sample.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(raw);

    AudioPayload::from(out)
}
