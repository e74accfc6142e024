//! Real-time mixer and master bus.
//!
//! This module provides the [`RtMixer`] struct which runs on the audio thread:
//! it applies [`ControlMessage`]s from the host, mixes the active
//! [`VoiceSlot`]s, and passes the sum through the master bus gain.
//!
//! Natural voice completion is reported back as
//! [`AudioMessage::VoiceEnded`]. Explicit stops are not reported, since the
//! host initiated them.

use cpal::Sample;

use crate::messages::{AudioMessage, ControlMessage, VoiceId};
use crate::playback::constants::{MASTER_SMOOTHING_S, MAX_VOICES, VOLUME_MAX, VOLUME_MIN};
use crate::playback::decoder::DecodedBuffer;
use crate::playback::gain::SmoothedGain;
use crate::playback::voice_slot::VoiceSlot;

/// Real-time mixer feeding the output device.
///
/// All storage is allocated up front; the audio callback never allocates.
pub struct RtMixer {
    /// Number of output channels.
    channels: usize,

    /// Output sample rate in Hz.
    sample_rate: u32,

    /// Master bus gain shared by every voice.
    master: SmoothedGain,

    /// Voice slots.
    voices: [VoiceSlot; MAX_VOICES],
}

impl RtMixer {
    /// Creates a mixer for the given output format with the bus at
    /// `master_level`.
    pub fn new(channels: usize, sample_rate: u32, master_level: f32) -> Self {
        Self {
            channels,
            sample_rate,
            master: SmoothedGain::new(master_level, sample_rate, MASTER_SMOOTHING_S),
            voices: std::array::from_fn(|_| VoiceSlot::new()),
        }
    }

    /// Applies one control message. Replies go through `emit`.
    pub fn apply(&mut self, message: ControlMessage, emit: &mut impl FnMut(AudioMessage)) {
        match message {
            ControlMessage::Ping() => emit(AudioMessage::Pong()),
            ControlMessage::SetMasterVolume(level) => self.set_master_volume(level),
            ControlMessage::StartVoice {
                voice,
                buffer,
                gain,
            } => {
                if !self.start_voice(voice, buffer, gain) {
                    emit(AudioMessage::VoiceEnded { voice });
                }
            }
            ControlMessage::FadeVoice {
                voice,
                from,
                seconds,
            } => self.fade_voice(voice, from, seconds),
            ControlMessage::StopAll() => self.stop_all(),
        }
    }

    /// Starts a voice in a free slot. Returns `false` if it could not start.
    ///
    /// The buffer must match the output layout and rate; the host converts
    /// it before sending.
    pub fn start_voice(&mut self, voice: VoiceId, buffer: DecodedBuffer, gain: f32) -> bool {
        if buffer.channels != self.channels || buffer.sample_rate != self.sample_rate {
            return false;
        }

        let gain = if gain.is_finite() {
            gain.clamp(VOLUME_MIN, VOLUME_MAX)
        } else {
            0.0
        };

        for slot in &mut self.voices {
            if !slot.active {
                slot.start(voice, buffer, gain);
                return true;
            }
        }

        // No free voice slot: drop deterministically.
        false
    }

    /// Ramps a voice's gain to silence, starting from `from`.
    pub fn fade_voice(&mut self, voice: VoiceId, from: f32, seconds: f32) {
        let frames = if seconds.is_finite() && seconds > 0.0 {
            (seconds * self.sample_rate as f32).round() as u32
        } else {
            0
        };

        for slot in &mut self.voices {
            if slot.is_playing_voice(voice) {
                slot.fade(from, frames);
            }
        }
    }

    /// Stops all active voices.
    pub fn stop_all(&mut self) {
        for slot in &mut self.voices {
            slot.stop();
        }
    }

    /// Sets the master bus target. Invalid values are ignored.
    pub fn set_master_volume(&mut self, level: f32) {
        if !level.is_finite() || !(VOLUME_MIN..=VOLUME_MAX).contains(&level) {
            return;
        }

        self.master.set_target(level);
    }

    /// Renders audio frames to the output buffer.
    ///
    /// Voices that run out of frames are freed and reported through `emit`.
    pub fn render(&mut self, output: &mut [f32], emit: &mut impl FnMut(AudioMessage)) {
        output.fill(Sample::EQUILIBRIUM);

        if self.channels == 0 {
            return;
        }

        for slot in &mut self.voices {
            if !slot.active {
                continue;
            }

            let voice = slot.voice;
            if !slot.render_into(output, self.channels) {
                emit(AudioMessage::VoiceEnded { voice });
            }
        }

        for frame in output.chunks_exact_mut(self.channels) {
            let master = self.master.next_gain();
            for sample in frame {
                *sample = (*sample * master).clamp(-1.0, 1.0);
            }
        }
    }

    #[cfg(test)]
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|slot| slot.active).count()
    }

    /// Gets the number of channels configured for this mixer.
    #[cfg(test)]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[cfg(test)]
    pub fn master_target(&self) -> f32 {
        self.master.target()
    }
}
