//! Playback-specific error types.

use thiserror::Error;

/// Errors that can occur while turning a payload into PCM.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The container could not be recognised or read.
    #[error("failed to decode audio payload: {0}")]
    Codec(#[from] symphonia::core::errors::Error),

    /// Generated payload was not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Payload has no default track.
    #[error("audio payload has no default track")]
    NoDefaultTrack,

    /// Payload is missing sample rate information.
    #[error("audio payload is missing a sample rate")]
    MissingSampleRate,

    /// Payload is missing channel information.
    #[error("audio payload is missing channel information")]
    MissingChannels,

    /// Payload decoded to zero frames.
    #[error("audio payload contains no samples")]
    Empty,

    /// The container declares more frames than its data holds.
    #[error("audio payload is truncated: {decoded} of {expected} frames")]
    Truncated { expected: u64, decoded: u64 },

    /// Failed to create resampler.
    #[error("failed to create resampler: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    /// Failed to resample audio.
    #[error("failed to resample audio: {0}")]
    Resample(#[from] rubato::ResampleError),
}

/// Errors raised by the output device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no audio output device found")]
    NoDevice,

    #[error("no default output config: {0}")]
    Config(String),

    #[error("failed to build output stream: {0}")]
    Build(String),

    #[error("failed to start output stream: {0}")]
    Play(String),

    /// Control ring buffer is full; the audio thread is not draining it.
    #[error("control buffer full")]
    BufferFull,
}

/// Outcome of a failed coordinator operation.
#[derive(Debug, Error)]
pub enum PlayError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The pad has no audio assigned.
    #[error("no audio assigned to pad")]
    PayloadMissing,

    /// Output was unavailable and could not be resumed.
    #[error("output device unavailable: {0}")]
    TransientDevice(#[from] DeviceError),

    #[error("volume out of range: {0}")]
    InvalidVolume(f32),

    #[error("master level out of range: {0}")]
    InvalidLevel(f32),
}
