use std::sync::Arc;

use crate::playback::decoder::DecodedBuffer;

/// Maps interleaved samples from one channel layout to another.
///
/// - Same channel count: returned unchanged
/// - Mono → N: the mono signal is copied to every output channel
/// - N → Mono: each frame is averaged
/// - N → M otherwise: output channel `c` takes input channel `c % N`
pub fn map_channels(samples: &[f32], file_channels: usize, output_channels: usize) -> Vec<f32> {
    if file_channels == output_channels || file_channels == 0 || output_channels == 0 {
        return samples.to_vec();
    }

    let frames = samples.len() / file_channels;
    let mut out = Vec::with_capacity(frames * output_channels);

    match (file_channels, output_channels) {
        (1, _) => {
            for &s in samples {
                out.extend(std::iter::repeat_n(s, output_channels));
            }
        }
        (_, 1) => {
            let scale = 1.0 / file_channels as f32;
            for frame in samples.chunks_exact(file_channels) {
                out.push(frame.iter().sum::<f32>() * scale);
            }
        }
        _ => {
            for frame in samples.chunks_exact(file_channels) {
                for channel in 0..output_channels {
                    out.push(frame[channel % file_channels]);
                }
            }
        }
    }

    out
}

/// Returns `buffer` laid out for `output_channels`, sharing the samples when
/// no conversion is needed.
pub fn conform_to_output(buffer: &DecodedBuffer, output_channels: usize) -> DecodedBuffer {
    if buffer.channels == output_channels {
        return buffer.clone();
    }

    let mapped = map_channels(&buffer.samples, buffer.channels, output_channels);
    DecodedBuffer {
        sample_rate: buffer.sample_rate,
        channels: output_channels,
        samples: Arc::from(mapped.into_boxed_slice()),
    }
}
