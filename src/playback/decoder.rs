//! Payload decoding.
//!
//! Turns an [`AudioPayload`] into a [`DecodedBuffer`]: interleaved `f32`
//! samples at the payload's own sample rate. Decoding runs entirely in memory
//! and keeps no state between calls.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::{
    audio::SampleBuffer as SymphoniaSampleBuffer, codecs::DecoderOptions,
    errors::Error as SymphoniaError, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use crate::playback::errors::DecodeError;
use crate::playback::payload::AudioPayload;

/// Fully decoded audio, randomly addressable by frame.
#[derive(Debug, Clone)]
pub struct DecodedBuffer {
    pub sample_rate: u32,
    pub channels: usize,
    pub samples: Arc<[f32]>,
}

impl DecodedBuffer {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    /// Sample at `frame` on `channel`, or `None` past the end.
    #[cfg(test)]
    pub fn sample(&self, frame: usize, channel: usize) -> Option<f32> {
        if channel >= self.channels {
            return None;
        }
        self.samples.get(frame * self.channels + channel).copied()
    }
}

/// Decodes a payload into interleaved `f32` PCM.
///
/// # Errors
///
/// - unrecognised or corrupt container ([`DecodeError::Codec`])
/// - no default track, sample rate or channel layout
/// - fewer frames than the container declares ([`DecodeError::Truncated`])
/// - no decodable frames ([`DecodeError::Empty`])
pub fn decode(payload: &AudioPayload) -> Result<DecodedBuffer, DecodeError> {
    let source = Cursor::new(payload.as_bytes().to_vec());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let probed = get_probe().format(
        &Hint::new(),
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format.default_track().ok_or(DecodeError::NoDefaultTrack)?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(DecodeError::MissingSampleRate)?;
    let channels = track
        .codec_params
        .channels
        .ok_or(DecodeError::MissingChannels)?
        .count();
    let expected_frames = track.codec_params.n_frames;

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut decoded: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(DecodeError::Codec(err)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = decoder.decode(&packet)?;
        let spec = *audio_buf.spec();
        let duration = audio_buf.capacity() as u64;

        let mut sample_buf = SymphoniaSampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        decoded.extend_from_slice(sample_buf.samples());
    }

    if channels == 0 {
        return Err(DecodeError::Empty);
    }

    // A reader that runs out of data mid-stream ends cleanly; compare against
    // what the container declared.
    let decoded_frames = (decoded.len() / channels) as u64;
    if let Some(expected) = expected_frames {
        if decoded_frames < expected {
            return Err(DecodeError::Truncated {
                expected,
                decoded: decoded_frames,
            });
        }
    }

    if decoded_frames == 0 {
        return Err(DecodeError::Empty);
    }

    log::debug!(
        "Decoded payload: {} frames, {} ch @ {} Hz",
        decoded_frames,
        channels,
        sample_rate
    );

    Ok(DecodedBuffer {
        sample_rate,
        channels,
        samples: Arc::from(decoded.into_boxed_slice()),
    })
}
