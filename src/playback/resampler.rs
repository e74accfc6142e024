//! Sample-rate conversion.
//!
//! Decoded buffers keep the payload's own rate. Before a buffer is handed to
//! the mixer it is converted to the output rate here, on the host or a decode
//! worker, so the audio callback only ever copies frames.

use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::playback::decoder::DecodedBuffer;
use crate::playback::errors::DecodeError;

/// Returns `buffer` at `output_rate`, sharing the samples when the rates
/// already match.
pub fn resample_to(buffer: &DecodedBuffer, output_rate: u32) -> Result<DecodedBuffer, DecodeError> {
    if buffer.sample_rate == output_rate || buffer.frames() == 0 {
        return Ok(buffer.clone());
    }

    let channels = buffer.channels;
    let input_frames = buffer.frames();

    log::debug!(
        "Resampling {} frames from {} Hz to {} Hz ({} ch)",
        input_frames,
        buffer.sample_rate,
        output_rate,
        channels
    );

    // Band-limited so downsampling high-rate uploads does not alias.
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(
        f64::from(output_rate) / f64::from(buffer.sample_rate),
        1.0,
        params,
        input_frames,
        channels,
    )?;

    let planar = deinterleave(&buffer.samples, channels);
    let resampled = resampler.process(&planar, None)?;
    let samples = interleave(&resampled);

    Ok(DecodedBuffer {
        sample_rate: output_rate,
        channels,
        samples: Arc::from(samples.into_boxed_slice()),
    })
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];

    for frame in samples.chunks_exact(channels) {
        for (channel, &sample) in planar.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }

    planar
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(frames * planar.len());

    for frame in 0..frames {
        for channel in planar {
            out.push(channel[frame]);
        }
    }

    out
}
