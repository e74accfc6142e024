//! Playback configuration constants and limits.

/// Render-side voice slots. Solo playback needs one; the rest absorb
/// stop/start overlap inside a single callback.
pub const MAX_VOICES: usize = 8;

/// Capacity of each host <-> audio thread ring buffer.
pub const RING_CAPACITY: usize = 1024;

/// Fixed cpal buffer size in frames.
pub const OUTPUT_BUFFER_FRAMES: u32 = 512;

/// Minimum volume level (silence).
pub const VOLUME_MIN: f32 = 0.0;

/// Maximum volume level (100%).
pub const VOLUME_MAX: f32 = 1.0;

/// Time constant of the master bus smoother, in seconds.
pub const MASTER_SMOOTHING_S: f32 = 0.015;

/// Fades at or below this duration are treated as a hard stop.
pub const FADE_EPSILON_S: f64 = 0.001;

/// Longest fade accepted from the host, in seconds.
pub const MAX_FADE_S: f64 = 3_600.0;

/// Audio-thread messages kept for `receive_message` before the oldest are
/// dropped.
pub const MAX_PENDING_MESSAGES: usize = RING_CAPACITY;

/// Sample rate of PCM returned by the speech generator.
pub const GENERATED_SAMPLE_RATE: u32 = 24_000;

/// Channel count of PCM returned by the speech generator.
pub const GENERATED_CHANNELS: u16 = 1;

/// Bit depth of PCM returned by the speech generator.
pub const GENERATED_BITS_PER_SAMPLE: u16 = 16;
