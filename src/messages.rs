//! Message definitions for communication between the host and the audio thread.
//!
//! [`ControlMessage`] and [`AudioMessage`] are the wire format of the ring
//! buffers between the host thread and the real-time audio thread.
//! [`LoaderEvent`] carries results from decode workers back to the host, and
//! [`PlaybackEvent`] is what the host-facing API reports upward.

use pyo3::prelude::*;

use crate::playback::decoder::DecodedBuffer;
use crate::playback::errors::DecodeError;

/// Identifier of a voice. Allocated monotonically and never reused.
pub type VoiceId = u64;

/// Message that is emitted from the audio thread.
#[derive(Debug, Clone, PartialEq)]
#[pyclass]
pub enum AudioMessage {
    /// Response to a Ping message.
    Pong(),

    /// A voice played through to its last frame.
    VoiceEnded { voice: VoiceId },
}

#[pymethods]
impl AudioMessage {
    pub fn voice_ended(&self) -> Option<VoiceId> {
        match self {
            AudioMessage::VoiceEnded { voice } => Some(*voice),
            _ => None,
        }
    }
}

/// Message that is emitted from the host side.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    /// Used for testing message passing functionality.
    Ping(),

    /// Set the master bus target level.
    ///
    /// # Parameters
    /// * `level` - Target level (0.0 to 1.0), approached smoothly
    SetMasterVolume(f32),

    /// Start a voice from frame 0.
    ///
    /// # Parameters
    /// * `voice` - Identifier allocated by the coordinator
    /// * `buffer` - Decoded audio already at the output rate and channel count
    /// * `gain` - Per-voice gain (0.0 to 1.0)
    StartVoice {
        voice: VoiceId,
        buffer: DecodedBuffer,
        gain: f32,
    },

    /// Ramp a voice's gain linearly from `from` to silence over `seconds`.
    FadeVoice {
        voice: VoiceId,
        from: f32,
        seconds: f32,
    },

    /// Stop all currently active voices.
    StopAll(),
}

/// Results delivered from background decode workers.
#[derive(Debug)]
pub enum LoaderEvent {
    /// A `play_async` decode finished.
    Decoded {
        request: u64,
        volume: f32,
        result: Result<DecodedBuffer, DecodeError>,
    },
}

/// Events reported to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// A voice started. `request` is set when it came from `play_async`.
    Started {
        request: Option<u64>,
        voice: VoiceId,
    },

    /// An asynchronous play request failed.
    Failed { request: u64, error: String },

    /// A voice ended naturally.
    Ended { voice: VoiceId },

    /// A fade reached its end and stopped everything.
    Faded,
}
