//! Host-side voice records.
//!
//! A [`Voice`] is the coordinator's handle on one playback instance running
//! in a render slot of the [`RtMixer`](crate::playback::mixer::RtMixer). It
//! tracks the voice's gain schedule and lifecycle state; the audio itself
//! lives on the audio thread.

use std::time::{Duration, Instant};

use crate::messages::VoiceId;
use crate::playback::gain::GainTimeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Playing,
    Fading,
    Ended,
    Stopped,
}

impl VoiceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Stopped)
    }
}

/// A single registered voice.
#[derive(Debug, Clone)]
pub struct Voice {
    /// Identifier shared with the render slot.
    pub id: VoiceId,

    /// Per-voice gain schedule.
    pub gain: GainTimeline,

    /// When playback was started.
    pub started_at: Instant,

    /// Length of the decoded buffer.
    pub duration: Duration,

    state: VoiceState,
}

impl Voice {
    /// Creates a voice in the `Playing` state at `gain`.
    pub fn new(id: VoiceId, gain: f32, duration: Duration, now: Instant) -> Self {
        Self {
            id,
            gain: GainTimeline::hold(gain, now),
            started_at: now,
            duration,
            state: VoiceState::Playing,
        }
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// Begins a linear fade reaching silence at `until`. Returns the gain the
    /// fade starts from.
    pub fn fade_out(&mut self, now: Instant, until: Instant) -> f32 {
        self.state = VoiceState::Fading;
        self.gain.ramp_to(0.0, now, until)
    }

    /// Explicit stop. Returns `false` if the voice was already terminal.
    pub fn stop(&mut self, now: Instant) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.gain.cancel(now);
        self.state = VoiceState::Stopped;
        true
    }

    /// Natural completion. Returns `false` if the voice was already terminal.
    pub fn end(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = VoiceState::Ended;
        true
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }
}
