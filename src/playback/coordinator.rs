//! Playback coordinator.
//!
//! The [`Coordinator`] owns the active voice registry, the pending fade and
//! the output (mixer bus). Every registry mutation happens on the host thread
//! through one of its operations:
//!
//! - [`Coordinator::play`] decodes, silences whatever is playing, then starts
//!   one new voice (solo policy)
//! - [`Coordinator::stop_all`] stops everything and cancels a pending fade
//! - [`Coordinator::fade_all`] ramps every voice to silence and schedules one
//!   deferred stop
//! - [`Coordinator::set_master_volume`] moves the shared bus level
//!
//! Deferred work and audio-thread notifications are processed in
//! [`Coordinator::poll`], which the host calls from its event loop.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::messages::{AudioMessage, ControlMessage, PlaybackEvent, VoiceId};
use crate::playback::channels::conform_to_output;
use crate::playback::constants::{FADE_EPSILON_S, MAX_PENDING_MESSAGES, VOLUME_MAX, VOLUME_MIN};
use crate::playback::decoder::{DecodedBuffer, decode};
use crate::playback::deferred::DeferredSlot;
use crate::playback::errors::{DecodeError, DeviceError, PlayError};
use crate::playback::output::{OpenOutput, OutputSink};
use crate::playback::payload::AudioPayload;
use crate::playback::resampler::resample_to;
use crate::playback::voice::Voice;

pub struct Coordinator<S: OutputSink> {
    open_output: OpenOutput<S>,

    /// The mixer bus. Opened on first playback, closed by `shut_down`.
    output: Option<S>,

    master_level: f32,
    voices: HashMap<VoiceId, Voice>,
    pending_fade: DeferredSlot,
    next_voice: VoiceId,

    events: VecDeque<PlaybackEvent>,
    unhandled: VecDeque<AudioMessage>,
}

fn validate_volume(volume: f32) -> Result<f32, PlayError> {
    if !volume.is_finite() {
        return Err(PlayError::InvalidVolume(volume));
    }
    Ok(volume.clamp(VOLUME_MIN, VOLUME_MAX))
}

impl<S: OutputSink> Coordinator<S> {
    pub fn new(open_output: OpenOutput<S>) -> Self {
        Self {
            open_output,
            output: None,
            master_level: VOLUME_MAX,
            voices: HashMap::new(),
            pending_fade: DeferredSlot::new(),
            next_voice: 0,
            events: VecDeque::new(),
            unhandled: VecDeque::new(),
        }
    }

    /// Decodes `payload` and plays it as the only voice.
    ///
    /// On error nothing changes: no voice is registered and whatever was
    /// playing keeps playing.
    pub fn play(
        &mut self,
        payload: &AudioPayload,
        volume: f32,
        now: Instant,
    ) -> Result<VoiceId, PlayError> {
        let volume = validate_volume(volume)?;
        let buffer = decode(payload).inspect_err(|err| {
            log::warn!("Rejecting payload of {} bytes: {err}", payload.len());
        })?;
        self.start_decoded(buffer, volume, now)
    }

    /// Plays an already decoded buffer as the only voice.
    ///
    /// The buffer is converted to the output's rate and channel layout here,
    /// before anything that is playing is touched.
    pub fn start_decoded(
        &mut self,
        buffer: DecodedBuffer,
        volume: f32,
        now: Instant,
    ) -> Result<VoiceId, PlayError> {
        let volume = validate_volume(volume)?;
        let (channels, sample_rate) = self.ensure_output()?;

        let duration = buffer.duration();
        let buffer = resample_to(&buffer, sample_rate)?;
        let buffer = conform_to_output(&buffer, channels);

        // Solo: the bus must accept the stop before the old voices are dropped.
        self.send(ControlMessage::StopAll())?;
        self.clear_voices(now);

        self.next_voice += 1;
        let id = self.next_voice;
        let voice = Voice::new(id, volume, duration, now);
        log::debug!(
            "Starting voice {id} ({:.3}s, gain {volume:.2})",
            voice.duration.as_secs_f64()
        );
        self.voices.insert(id, voice);

        if let Err(err) = self.send(ControlMessage::StartVoice {
            voice: id,
            buffer,
            gain: volume,
        }) {
            self.voices.remove(&id);
            return Err(err.into());
        }

        Ok(id)
    }

    /// Applies the result of an asynchronous decode started for `request`.
    pub fn complete_request(
        &mut self,
        request: u64,
        volume: f32,
        result: Result<DecodedBuffer, DecodeError>,
        now: Instant,
    ) {
        let outcome = result
            .map_err(PlayError::from)
            .and_then(|buffer| self.start_decoded(buffer, volume, now));

        let event = match outcome {
            Ok(voice) => PlaybackEvent::Started {
                request: Some(request),
                voice,
            },
            Err(err) => {
                log::warn!("Play request {request} failed: {err}");
                PlaybackEvent::Failed {
                    request,
                    error: err.to_string(),
                }
            }
        };
        self.events.push_back(event);
    }

    /// Stops every voice immediately and cancels any pending fade.
    pub fn stop_all(&mut self, now: Instant) {
        self.clear_voices(now);

        if self.output.is_some() {
            if let Err(err) = self.send(ControlMessage::StopAll()) {
                log::warn!("Failed to send StopAll: {err}");
            }
        }
    }

    /// Fades every voice to silence over `duration`, then stops them all.
    ///
    /// A fade in progress is replaced: each voice ramps from whatever gain it
    /// has reached.
    pub fn fade_all(&mut self, duration: Duration, now: Instant) {
        if self.voices.is_empty() {
            return;
        }

        if duration.as_secs_f64() <= FADE_EPSILON_S {
            self.stop_all(now);
            return;
        }

        let Some(due) = now.checked_add(duration) else {
            log::warn!("Ignoring fade of {duration:?}: deadline out of range");
            return;
        };

        self.pending_fade.cancel();

        let seconds = duration.as_secs_f32();
        let mut ramps = Vec::with_capacity(self.voices.len());
        for (&id, voice) in &mut self.voices {
            let from = voice.fade_out(now, due);
            ramps.push(ControlMessage::FadeVoice {
                voice: id,
                from,
                seconds,
            });
        }

        for ramp in ramps {
            if let Err(err) = self.send(ramp) {
                log::warn!("Failed to send fade: {err}");
            }
        }

        let task = self.pending_fade.schedule(due);
        log::debug!(
            "Fading {} voice(s) over {seconds:.3}s (task {})",
            self.voices.len(),
            task.token
        );
    }

    /// Sets the master bus level. Finite values are clamped to `0.0..=1.0`.
    ///
    /// Before the bus exists the level is remembered and applied when it is
    /// created.
    pub fn set_master_volume(&mut self, level: f32) -> Result<(), PlayError> {
        if !level.is_finite() {
            return Err(PlayError::InvalidLevel(level));
        }

        let level = level.clamp(VOLUME_MIN, VOLUME_MAX);
        if (level - self.master_level).abs() < f32::EPSILON {
            return Ok(());
        }

        if self.output.is_some() {
            self.send(ControlMessage::SetMasterVolume(level))?;
        }
        self.master_level = level;
        Ok(())
    }

    /// Processes audio-thread notifications and fires a due fade.
    pub fn poll(&mut self, now: Instant) {
        self.drain_output();

        if let Some(task) = self.pending_fade.take_due(now) {
            log::debug!("Fade task {} completed", task.token);
            self.stop_all(now);
            self.events.push_back(PlaybackEvent::Faded);
        }
    }

    /// Next instant at which `poll` has scheduled work.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending_fade.pending().map(|task| task.due)
    }

    pub fn take_event(&mut self) -> Option<PlaybackEvent> {
        self.events.pop_front()
    }

    /// Asks the audio thread for a `Pong`.
    pub fn ping(&mut self) -> Result<(), PlayError> {
        self.ensure_output()?;
        self.send(ControlMessage::Ping())?;
        Ok(())
    }

    /// Next audio-thread message not consumed by the coordinator itself.
    pub fn receive_message(&mut self) -> Option<AudioMessage> {
        self.drain_output();
        self.unhandled.pop_front()
    }

    /// Stops everything and closes the output.
    pub fn shut_down(&mut self, now: Instant) {
        self.stop_all(now);
        if self.output.take().is_some() {
            log::info!("Mixer bus shut down");
        }
        self.unhandled.clear();
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    #[cfg(test)]
    pub fn voice(&self, id: VoiceId) -> Option<&Voice> {
        self.voices.get(&id)
    }

    pub fn master_level(&self) -> f32 {
        self.master_level
    }

    pub fn has_pending_fade(&self) -> bool {
        self.pending_fade.is_pending()
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.output.is_some()
    }

    /// Sample rate of the open bus, if any.
    pub fn output_rate(&self) -> Option<u32> {
        self.output.as_ref().map(|output| output.sample_rate())
    }

    /// Opens the bus on first use and makes sure it is rendering, resuming
    /// it once if needed. Returns the output channel count and sample rate.
    fn ensure_output(&mut self) -> Result<(usize, u32), DeviceError> {
        let output = match self.output.take() {
            Some(output) => output,
            None => {
                let output = (self.open_output)(self.master_level)?;
                log::info!(
                    "Mixer bus created ({} ch @ {} Hz, master {:.2})",
                    output.channels(),
                    output.sample_rate(),
                    self.master_level
                );
                output
            }
        };
        let output = self.output.insert(output);

        if !output.is_running() {
            log::warn!("Output not running, attempting resume");
            output.resume()?;
        }

        Ok((output.channels(), output.sample_rate()))
    }

    /// Empties the registry and cancels any pending fade. The audio thread
    /// is not told.
    fn clear_voices(&mut self, now: Instant) {
        if self.pending_fade.cancel() {
            log::debug!("Cancelled pending fade");
        }

        for (_, mut voice) in self.voices.drain() {
            if voice.stop(now) {
                log::debug!(
                    "Voice {} stopped after {:.3}s",
                    voice.id,
                    voice.elapsed(now).as_secs_f64()
                );
            }
        }
    }

    fn send(&mut self, message: ControlMessage) -> Result<(), DeviceError> {
        match self.output.as_mut() {
            Some(output) => output.send(message),
            None => Err(DeviceError::NoDevice),
        }
    }

    fn drain_output(&mut self) {
        let Some(output) = self.output.as_mut() else {
            return;
        };

        let mut ended = Vec::new();
        while let Some(message) = output.receive() {
            match message {
                AudioMessage::VoiceEnded { voice } => ended.push(voice),
                other => {
                    if self.unhandled.len() >= MAX_PENDING_MESSAGES {
                        self.unhandled.pop_front();
                        log::debug!("Dropping oldest unreceived audio message");
                    }
                    self.unhandled.push_back(other);
                }
            }
        }

        for voice in ended {
            self.handle_voice_ended(voice);
        }
    }

    fn handle_voice_ended(&mut self, id: VoiceId) {
        let Some(mut voice) = self.voices.remove(&id) else {
            log::debug!("Voice {id} ended after it was stopped");
            return;
        };

        if voice.end() {
            log::debug!("Voice {id} ended");
            self.events.push_back(PlaybackEvent::Ended { voice: id });
        }

        if self.voices.is_empty() && self.pending_fade.cancel() {
            log::debug!("Last voice ended during fade");
        }
    }

    #[cfg(test)]
    pub(crate) fn output_mut(&mut self) -> Option<&mut S> {
        self.output.as_mut()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::playback::payload::{PcmFormat, wrap_pcm};
    use crate::playback::voice::VoiceState;

    #[derive(Default)]
    pub(crate) struct FakeOutput {
        pub sent: Vec<ControlMessage>,
        pub inbox: VecDeque<AudioMessage>,
        pub running: bool,
        pub resume_ok: bool,
        pub resume_calls: usize,
        pub opened_with: f32,
        pub full: bool,
    }

    impl FakeOutput {
        fn stop_alls(&self) -> usize {
            self.sent
                .iter()
                .filter(|m| matches!(m, ControlMessage::StopAll()))
                .count()
        }
    }

    impl OutputSink for FakeOutput {
        fn channels(&self) -> usize {
            2
        }

        fn sample_rate(&self) -> u32 {
            48_000
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn resume(&mut self) -> Result<(), DeviceError> {
            self.resume_calls += 1;
            if self.resume_ok {
                self.running = true;
                Ok(())
            } else {
                Err(DeviceError::Play("device suspended".to_string()))
            }
        }

        fn send(&mut self, message: ControlMessage) -> Result<(), DeviceError> {
            if self.full {
                return Err(DeviceError::BufferFull);
            }
            self.sent.push(message);
            Ok(())
        }

        fn receive(&mut self) -> Option<AudioMessage> {
            self.inbox.pop_front()
        }
    }

    pub(crate) fn open_ok(level: f32) -> Result<FakeOutput, DeviceError> {
        Ok(FakeOutput {
            running: true,
            resume_ok: true,
            opened_with: level,
            ..Default::default()
        })
    }

    fn open_suspended(level: f32) -> Result<FakeOutput, DeviceError> {
        Ok(FakeOutput {
            running: false,
            resume_ok: true,
            opened_with: level,
            ..Default::default()
        })
    }

    fn open_missing(_: f32) -> Result<FakeOutput, DeviceError> {
        Err(DeviceError::NoDevice)
    }

    /// `frames` of 24 kHz mono 16-bit speech at a constant level.
    pub(crate) fn speech(frames: usize, value: i16) -> AudioPayload {
        let raw: Vec<u8> = std::iter::repeat_n(value, frames)
            .flat_map(|s| s.to_le_bytes())
            .collect();
        wrap_pcm(&raw, PcmFormat::GENERATED_SPEECH)
    }

    fn coordinator() -> Coordinator<FakeOutput> {
        Coordinator::new(open_ok)
    }

    fn fake(c: &mut Coordinator<FakeOutput>) -> &mut FakeOutput {
        c.output_mut().unwrap()
    }

    #[test]
    fn test_bus_is_created_lazily() {
        let mut c = coordinator();
        let t0 = Instant::now();

        assert!(!c.is_open());
        c.stop_all(t0);
        c.fade_all(Duration::from_secs(1), t0);
        assert!(!c.is_open());

        c.play(&speech(2_400, 1_000), 1.0, t0).unwrap();
        assert!(c.is_open());
    }

    #[test]
    fn test_play_registers_one_voice() {
        let mut c = coordinator();
        let t0 = Instant::now();

        let id = c.play(&speech(2_400, 1_000), 0.5, t0).unwrap();

        assert_eq!(c.active_voices(), 1);
        let voice = c.voice(id).unwrap();
        assert_eq!(voice.state(), VoiceState::Playing);
        assert!((voice.gain.value_at(t0) - 0.5).abs() < 1e-6);
        assert!((voice.duration.as_secs_f64() - 0.1).abs() < 1e-6);

        let sent = &fake(&mut c).sent;
        assert!(matches!(sent[0], ControlMessage::StopAll()));
        match &sent[1] {
            ControlMessage::StartVoice {
                voice,
                buffer,
                gain,
            } => {
                assert_eq!(*voice, id);
                assert_eq!(buffer.channels, 2);
                assert_eq!(buffer.sample_rate, 48_000);
                assert!((gain - 0.5).abs() < 1e-6);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_second_play_replaces_first() {
        let mut c = coordinator();
        let t0 = Instant::now();

        let a = c.play(&speech(2_400, 1_000), 0.5, t0).unwrap();
        let b = c.play(&speech(4_800, 2_000), 1.0, t0).unwrap();

        assert_eq!(c.active_voices(), 1);
        assert!(c.voice(a).is_none());
        let voice = c.voice(b).unwrap();
        assert!((voice.gain.value_at(t0) - 1.0).abs() < 1e-6);
        assert!((voice.duration.as_secs_f64() - 0.2).abs() < 1e-6);

        let sent = &fake(&mut c).sent;
        let n = sent.len();
        assert!(matches!(sent[n - 2], ControlMessage::StopAll()));
        assert!(matches!(
            sent[n - 1],
            ControlMessage::StartVoice { voice, .. } if voice == b
        ));
    }

    #[test]
    fn test_solo_invariant_over_many_plays() {
        let mut c = coordinator();
        let t0 = Instant::now();

        for i in 0..20u64 {
            let now = t0 + Duration::from_millis(i * 7);
            c.play(&speech(240, 500), 0.8, now).unwrap();
            assert!(c.active_voices() <= 1);
            if i % 3 == 0 {
                c.fade_all(Duration::from_millis(50), now);
            }
            c.poll(now);
            assert!(c.active_voices() <= 1);
        }
    }

    #[test]
    fn test_corrupt_payload_leaves_registry_untouched() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let a = c.play(&speech(2_400, 1_000), 0.5, t0).unwrap();
        let sent_before = fake(&mut c).sent.len();

        let wav = speech(2_400, 1_000);
        let corrupt = AudioPayload::from(&wav.as_bytes()[..30]);
        let result = c.play(&corrupt, 1.0, t0);

        assert!(matches!(result, Err(PlayError::Decode(_))));
        assert_eq!(c.active_voices(), 1);
        assert!(c.voice(a).is_some());
        assert_eq!(fake(&mut c).sent.len(), sent_before);
    }

    #[test]
    fn test_payload_cut_inside_data_is_rejected() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let a = c.play(&speech(2_400, 1_000), 0.5, t0).unwrap();
        let sent_before = fake(&mut c).sent.len();

        let wav = speech(2_400, 1_000);
        let cut = AudioPayload::from(&wav.as_bytes()[..1_000]);
        let result = c.play(&cut, 1.0, t0);

        assert!(matches!(
            result,
            Err(PlayError::Decode(DecodeError::Truncated { .. }))
        ));
        assert!(c.voice(a).is_some());
        assert_eq!(fake(&mut c).sent.len(), sent_before);
    }

    #[test]
    fn test_full_control_ring_keeps_current_voice() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let a = c.play(&speech(2_400, 1_000), 0.5, t0).unwrap();
        fake(&mut c).full = true;

        let result = c.play(&speech(2_400, 2_000), 1.0, t0);

        assert!(matches!(
            result,
            Err(PlayError::TransientDevice(DeviceError::BufferFull))
        ));
        assert_eq!(c.active_voices(), 1);
        assert!(c.voice(a).is_some());
    }

    #[test]
    fn test_invalid_volume() {
        let mut c = coordinator();
        let t0 = Instant::now();

        let result = c.play(&speech(240, 1), f32::NAN, t0);
        assert!(matches!(result, Err(PlayError::InvalidVolume(_))));
        assert_eq!(c.active_voices(), 0);

        let id = c.play(&speech(240, 1), 1.5, t0).unwrap();
        assert!((c.voice(id).unwrap().gain.value_at(t0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_stop_all_empties_registry() {
        let mut c = coordinator();
        let t0 = Instant::now();

        c.stop_all(t0);
        assert_eq!(c.active_voices(), 0);

        c.play(&speech(2_400, 1_000), 1.0, t0).unwrap();
        c.stop_all(t0);
        assert_eq!(c.active_voices(), 0);
        c.stop_all(t0);
        assert_eq!(c.active_voices(), 0);
        assert!(!c.has_pending_fade());
    }

    #[test]
    fn test_fade_zero_is_stop_all() {
        let mut c = coordinator();
        let t0 = Instant::now();
        c.play(&speech(2_400, 1_000), 1.0, t0).unwrap();

        c.fade_all(Duration::ZERO, t0);

        assert_eq!(c.active_voices(), 0);
        assert!(!c.has_pending_fade());
        assert!(
            !fake(&mut c)
                .sent
                .iter()
                .any(|m| matches!(m, ControlMessage::FadeVoice { .. }))
        );
    }

    #[test]
    fn test_fade_below_epsilon_is_stop_all() {
        let mut c = coordinator();
        let t0 = Instant::now();
        c.play(&speech(2_400, 1_000), 1.0, t0).unwrap();

        c.fade_all(Duration::from_micros(500), t0);

        assert_eq!(c.active_voices(), 0);
        assert!(!c.has_pending_fade());
        assert!(
            !fake(&mut c)
                .sent
                .iter()
                .any(|m| matches!(m, ControlMessage::FadeVoice { .. }))
        );
    }

    #[test]
    fn test_fade_above_epsilon_is_deferred() {
        let mut c = coordinator();
        let t0 = Instant::now();
        c.play(&speech(2_400, 1_000), 1.0, t0).unwrap();

        c.fade_all(Duration::from_millis(2), t0);

        assert_eq!(c.active_voices(), 1);
        assert_eq!(c.next_deadline(), Some(t0 + Duration::from_millis(2)));
        assert!(matches!(
            fake(&mut c).sent.last(),
            Some(ControlMessage::FadeVoice { .. })
        ));

        c.poll(t0 + Duration::from_millis(2));
        assert_eq!(c.active_voices(), 0);
    }

    #[test]
    fn test_fade_past_clock_range_changes_nothing() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let id = c.play(&speech(2_400, 1_000), 1.0, t0).unwrap();
        let sent_before = fake(&mut c).sent.len();

        c.fade_all(Duration::MAX, t0);

        assert_eq!(c.voice(id).unwrap().state(), VoiceState::Playing);
        assert!(!c.has_pending_fade());
        assert_eq!(fake(&mut c).sent.len(), sent_before);
    }

    #[test]
    fn test_fade_with_no_voices_is_noop() {
        let mut c = coordinator();
        let t0 = Instant::now();
        c.play(&speech(240, 1_000), 1.0, t0).unwrap();
        c.stop_all(t0);
        let sent_before = fake(&mut c).sent.len();

        c.fade_all(Duration::from_secs(1), t0);

        assert!(!c.has_pending_fade());
        assert_eq!(fake(&mut c).sent.len(), sent_before);
    }

    #[test]
    fn test_fade_completes_with_stop() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let id = c.play(&speech(48_000, 1_000), 0.8, t0).unwrap();

        c.fade_all(Duration::from_secs(1), t0);
        assert_eq!(c.voice(id).unwrap().state(), VoiceState::Fading);
        assert_eq!(c.next_deadline(), Some(t0 + Duration::from_secs(1)));
        assert!(matches!(
            fake(&mut c).sent.last(),
            Some(ControlMessage::FadeVoice { from, .. }) if (*from - 0.8).abs() < 1e-6
        ));

        c.poll(t0 + Duration::from_millis(500));
        assert_eq!(c.active_voices(), 1);

        c.poll(t0 + Duration::from_secs(1));
        assert_eq!(c.active_voices(), 0);
        assert!(!c.has_pending_fade());
        assert_eq!(c.take_event(), Some(PlaybackEvent::Faded));
    }

    #[test]
    fn test_stop_during_fade_leaves_no_orphan() {
        let mut c = coordinator();
        let t0 = Instant::now();
        c.play(&speech(48_000, 1_000), 1.0, t0).unwrap();

        c.fade_all(Duration::from_secs(2), t0);
        c.stop_all(t0 + Duration::from_millis(100));
        let stops = fake(&mut c).stop_alls();

        c.poll(t0 + Duration::from_secs(5));
        assert_eq!(fake(&mut c).stop_alls(), stops);
        assert_eq!(c.take_event(), None);
    }

    #[test]
    fn test_refade_starts_from_current_gain() {
        let mut c = coordinator();
        let t0 = Instant::now();
        c.play(&speech(48_000, 1_000), 1.0, t0).unwrap();

        c.fade_all(Duration::from_secs(2), t0);
        let t1 = t0 + Duration::from_secs(1);
        c.fade_all(Duration::from_secs(2), t1);

        match fake(&mut c).sent.last() {
            Some(ControlMessage::FadeVoice { from, seconds, .. }) => {
                assert!((from - 0.5).abs() < 1e-3);
                assert!((seconds - 2.0).abs() < 1e-6);
            }
            other => panic!("unexpected message {other:?}"),
        }

        // The first fade's deadline no longer applies.
        c.poll(t0 + Duration::from_millis(2_500));
        assert_eq!(c.active_voices(), 1);

        c.poll(t1 + Duration::from_secs(2));
        assert_eq!(c.active_voices(), 0);
    }

    #[test]
    fn test_play_during_fade_cancels_deferred_stop() {
        let mut c = coordinator();
        let t0 = Instant::now();
        c.play(&speech(48_000, 1_000), 1.0, t0).unwrap();
        c.fade_all(Duration::from_secs(2), t0);

        let b = c
            .play(&speech(96_000, 1_000), 1.0, t0 + Duration::from_millis(500))
            .unwrap();

        c.poll(t0 + Duration::from_secs(3));
        assert!(c.voice(b).is_some());
        assert_eq!(c.voice(b).unwrap().state(), VoiceState::Playing);
    }

    #[test]
    fn test_natural_end_deregisters() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let id = c.play(&speech(240, 1_000), 1.0, t0).unwrap();

        fake(&mut c)
            .inbox
            .push_back(AudioMessage::VoiceEnded { voice: id });
        c.poll(t0);

        assert_eq!(c.active_voices(), 0);
        assert_eq!(c.take_event(), Some(PlaybackEvent::Ended { voice: id }));
    }

    #[test]
    fn test_stale_end_after_stop_is_ignored() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let a = c.play(&speech(240, 1_000), 1.0, t0).unwrap();
        let b = c.play(&speech(240, 1_000), 1.0, t0).unwrap();

        fake(&mut c)
            .inbox
            .push_back(AudioMessage::VoiceEnded { voice: a });
        c.poll(t0);

        assert!(c.voice(b).is_some());
        assert_eq!(c.take_event(), None);
    }

    #[test]
    fn test_natural_end_during_fade_cancels_fade() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let id = c.play(&speech(240, 1_000), 1.0, t0).unwrap();
        c.fade_all(Duration::from_secs(1), t0);

        fake(&mut c)
            .inbox
            .push_back(AudioMessage::VoiceEnded { voice: id });
        c.poll(t0 + Duration::from_millis(10));

        assert!(!c.has_pending_fade());
        assert_eq!(c.next_deadline(), None);
    }

    #[test]
    fn test_master_volume_repeat_is_noop() {
        let mut c = coordinator();
        let t0 = Instant::now();
        c.play(&speech(240, 1_000), 1.0, t0).unwrap();

        c.set_master_volume(0.2).unwrap();
        c.set_master_volume(0.2).unwrap();

        let sets: Vec<f32> = fake(&mut c)
            .sent
            .iter()
            .filter_map(|m| match m {
                ControlMessage::SetMasterVolume(level) => Some(*level),
                _ => None,
            })
            .collect();
        assert_eq!(sets, vec![0.2]);
        assert!((c.master_level() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_master_volume_before_bus_is_applied_on_open() {
        let mut c = coordinator();
        let t0 = Instant::now();

        c.set_master_volume(1.7).unwrap();
        c.set_master_volume(0.4).unwrap();
        assert!(!c.is_open());
        assert!(matches!(
            c.set_master_volume(f32::INFINITY),
            Err(PlayError::InvalidLevel(_))
        ));

        c.play(&speech(240, 1_000), 1.0, t0).unwrap();
        assert!((fake(&mut c).opened_with - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_suspended_output_is_resumed_once() {
        let mut c = Coordinator::new(open_suspended);
        let t0 = Instant::now();

        c.play(&speech(240, 1_000), 1.0, t0).unwrap();
        assert_eq!(fake(&mut c).resume_calls, 1);
        assert_eq!(c.active_voices(), 1);
    }

    #[test]
    fn test_failed_resume_leaves_registry_unchanged() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let a = c.play(&speech(240, 1_000), 1.0, t0).unwrap();

        let output = fake(&mut c);
        output.running = false;
        output.resume_ok = false;
        let sent_before = output.sent.len();

        let result = c.play(&speech(240, 2_000), 1.0, t0);
        assert!(matches!(result, Err(PlayError::TransientDevice(_))));
        assert!(c.voice(a).is_some());
        assert_eq!(fake(&mut c).resume_calls, 1);
        assert_eq!(fake(&mut c).sent.len(), sent_before);
    }

    #[test]
    fn test_missing_device_is_reported() {
        let mut c = Coordinator::new(open_missing);
        let result = c.play(&speech(240, 1_000), 1.0, Instant::now());

        assert!(matches!(
            result,
            Err(PlayError::TransientDevice(DeviceError::NoDevice))
        ));
        assert!(!c.is_open());
        assert_eq!(c.active_voices(), 0);
    }

    #[test]
    fn test_complete_request_reports_outcome() {
        let mut c = coordinator();
        let t0 = Instant::now();

        let buffer = decode(&speech(240, 1_000)).unwrap();
        c.complete_request(7, 1.0, Ok(buffer), t0);
        c.complete_request(8, 1.0, Err(DecodeError::Empty), t0);

        assert!(matches!(
            c.take_event(),
            Some(PlaybackEvent::Started {
                request: Some(7),
                ..
            })
        ));
        assert!(matches!(
            c.take_event(),
            Some(PlaybackEvent::Failed { request: 8, .. })
        ));
        assert_eq!(c.active_voices(), 1);
    }

    #[test]
    fn test_ping_pong_passes_through() {
        let mut c = coordinator();
        c.ping().unwrap();
        assert!(matches!(
            fake(&mut c).sent.last(),
            Some(ControlMessage::Ping())
        ));

        fake(&mut c).inbox.push_back(AudioMessage::Pong());
        assert_eq!(c.receive_message(), Some(AudioMessage::Pong()));
        assert_eq!(c.receive_message(), None);
    }

    #[test]
    fn test_unreceived_messages_are_bounded() {
        let mut c = coordinator();
        c.ping().unwrap();

        for _ in 0..(MAX_PENDING_MESSAGES + 10) {
            fake(&mut c).inbox.push_back(AudioMessage::Pong());
        }
        c.poll(Instant::now());

        let mut received = 0;
        while c.receive_message().is_some() {
            received += 1;
        }
        assert_eq!(received, MAX_PENDING_MESSAGES);
    }

    #[test]
    fn test_shut_down_closes_bus() {
        let mut c = coordinator();
        let t0 = Instant::now();
        c.play(&speech(240, 1_000), 1.0, t0).unwrap();
        c.fade_all(Duration::from_secs(1), t0);

        c.shut_down(t0);
        assert!(!c.is_open());
        assert_eq!(c.active_voices(), 0);
        assert!(!c.has_pending_fade());

        c.play(&speech(240, 1_000), 1.0, t0).unwrap();
        assert!(c.is_open());
    }
}
