use crate::messages::VoiceId;
use crate::playback::decoder::DecodedBuffer;
use crate::playback::gain::GainRamp;

/// Render-side state of one voice.
pub struct VoiceSlot {
    pub active: bool,
    pub voice: VoiceId,
    buffer: Option<DecodedBuffer>,
    /// Next frame to render.
    position: usize,
    gain: GainRamp,
}

impl Default for VoiceSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceSlot {
    pub fn new() -> Self {
        Self {
            active: false,
            voice: 0,
            buffer: None,
            position: 0,
            gain: GainRamp::new(0.0),
        }
    }

    /// Starts `buffer` from its first frame. The buffer must already be at
    /// the output rate.
    pub fn start(&mut self, voice: VoiceId, buffer: DecodedBuffer, gain: f32) {
        self.active = true;
        self.voice = voice;
        self.buffer = Some(buffer);
        self.position = 0;
        self.gain.set(gain);
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.buffer = None;
        self.position = 0;
        self.gain.set(0.0);
    }

    pub fn fade(&mut self, from: f32, frames: u32) {
        self.gain.ramp(from, 0.0, frames);
    }

    pub fn is_playing_voice(&self, voice: VoiceId) -> bool {
        self.active && self.voice == voice
    }

    /// Mixes the next frames into `output` (interleaved, `channels` wide). Returns `false` once the buffer is exhausted; the slot is then
    /// stopped.
    pub fn render_into(&mut self, output: &mut [f32], channels: usize) -> bool {
        let mut exhausted = false;

        match self.buffer.as_ref() {
            Some(buffer) if buffer.channels == channels && buffer.frames() > 0 => {
                let total_frames = buffer.frames();

                for out_frame in output.chunks_exact_mut(channels) {
                    if self.position >= total_frames {
                        exhausted = true;
                        break;
                    }

                    let gain = self.gain.next_gain();
                    let base = self.position * channels;
                    let frame = &buffer.samples[base..base + channels];
                    for (out, &sample) in out_frame.iter_mut().zip(frame) {
                        *out += sample * gain;
                    }

                    self.position += 1;
                }
            }
            _ => exhausted = true,
        }

        if exhausted {
            self.stop();
        }
        !exhausted
    }
}
