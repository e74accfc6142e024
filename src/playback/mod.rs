//! Playback Module
//!
//! This module provides the soundboard's playback core.
//! It is organized into sub-modules, each with a specific responsibility:
//!
//! - [`payload`]: audio payloads and the PCM container wrapper
//! - [`decoder`]: payload decoding into [`DecodedBuffer`](decoder::DecodedBuffer)
//! - [`resampler`]: conversion to the output sample rate
//! - [`channels`]: channel layout mapping
//! - [`gain`]: per-voice ramps, master smoothing, host-side gain schedules
//! - [`voice`] / [`voice_slot`]: host-side voice records and render slots
//! - [`mixer`]: real-time mixer and master bus
//! - [`output`]: CPAL output stream management
//! - [`deferred`]: cancellable deferred tasks
//! - [`coordinator`]: voice registry, solo policy, fade/stop orchestration
//! - [`constants`]: configuration constants and limits
//! - [`errors`]: playback error types
//!
//! The [`Soundboard`] struct exposes the coordinator to Python.

use std::sync::Mutex;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::messages::{AudioMessage, LoaderEvent, PlaybackEvent, VoiceId};
use crate::playback::constants::MAX_FADE_S;
use crate::playback::coordinator::Coordinator;
use crate::playback::decoder::decode;
use crate::playback::errors::PlayError;
use crate::playback::output::AudioOutput;
use crate::playback::payload::AudioPayload;
use crate::playback::resampler::resample_to;

mod channels;
mod constants;
mod coordinator;
pub(crate) mod decoder;
mod deferred;
pub(crate) mod errors;
mod gain;
mod mixer;
mod output;
mod payload;
mod resampler;
mod voice;
mod voice_slot;

/// Python exception types raised by [`Soundboard`].
pub mod exceptions {
    use pyo3::create_exception;
    use pyo3::exceptions::PyException;

    create_exception!(
        soundboard_audio,
        DecodeError,
        PyException,
        "The audio payload could not be decoded."
    );
    create_exception!(
        soundboard_audio,
        PayloadMissingError,
        PyException,
        "The pad has no audio assigned."
    );
    create_exception!(
        soundboard_audio,
        TransientDeviceError,
        PyException,
        "The output device is unavailable."
    );
}

impl From<PlayError> for PyErr {
    fn from(err: PlayError) -> Self {
        let msg = err.to_string();
        match err {
            PlayError::Decode(_) => exceptions::DecodeError::new_err(msg),
            PlayError::PayloadMissing => exceptions::PayloadMissingError::new_err(msg),
            PlayError::TransientDevice(_) => exceptions::TransientDeviceError::new_err(msg),
            PlayError::InvalidVolume(_) | PlayError::InvalidLevel(_) => {
                PyValueError::new_err(msg)
            }
        }
    }
}

/// Soundboard playback for Python.
///
/// Nothing touches the audio device until the first sound is played.
#[pyclass]
pub struct Soundboard {
    coordinator: Mutex<Coordinator<AudioOutput>>,
    loader_tx: Sender<LoaderEvent>,
    loader_rx: Mutex<Receiver<LoaderEvent>>,
    next_request: u64,
}

impl Soundboard {
    fn coordinator(&mut self) -> PyResult<&mut Coordinator<AudioOutput>> {
        self.coordinator
            .get_mut()
            .map_err(|_| PyRuntimeError::new_err("Coordinator state poisoned"))
    }

    /// Applies finished decodes, audio-thread notifications and due fades.
    fn pump(&mut self, now: Instant) -> PyResult<()> {
        let loader_rx = self
            .loader_rx
            .get_mut()
            .map_err(|_| PyRuntimeError::new_err("Failed to acquire loader receiver lock"))?;
        let coordinator = self
            .coordinator
            .get_mut()
            .map_err(|_| PyRuntimeError::new_err("Coordinator state poisoned"))?;

        loop {
            match loader_rx.try_recv() {
                Ok(LoaderEvent::Decoded {
                    request,
                    volume,
                    result,
                }) => coordinator.complete_request(request, volume, result, now),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        coordinator.poll(now);
        Ok(())
    }
}

#[pymethods]
impl Soundboard {
    #[new]
    pub fn new() -> PyResult<Self> {
        let (loader_tx, loader_rx) = std::sync::mpsc::channel();

        Ok(Soundboard {
            coordinator: Mutex::new(Coordinator::new(AudioOutput::open)),
            loader_tx,
            loader_rx: Mutex::new(loader_rx),
            next_request: 0,
        })
    }

    /// Decode `payload` and play it, silencing whatever is playing.
    ///
    /// Returns the new voice id.
    #[pyo3(signature = (payload, volume = 1.0))]
    pub fn play(&mut self, payload: &[u8], volume: f32) -> PyResult<VoiceId> {
        let payload = AudioPayload::from(payload);
        Ok(self.coordinator()?.play(&payload, volume, Instant::now())?)
    }

    /// Play the audio assigned to a pad; `None` means nothing is assigned.
    #[pyo3(signature = (payload, volume = 1.0))]
    pub fn play_pad(&mut self, payload: Option<&[u8]>, volume: f32) -> PyResult<VoiceId> {
        let payload = payload.ok_or(PlayError::PayloadMissing)?;
        self.play(payload, volume)
    }

    /// Play base64-encoded raw PCM from the speech generator.
    #[pyo3(signature = (audio_b64, volume = 1.0))]
    pub fn play_generated(&mut self, audio_b64: &str, volume: f32) -> PyResult<VoiceId> {
        let payload = AudioPayload::from_generated_base64(audio_b64).map_err(PlayError::from)?;
        Ok(self.coordinator()?.play(&payload, volume, Instant::now())?)
    }

    /// Decode `payload` on a background thread and play it once decoded.
    ///
    /// Returns a request id; the outcome is reported by `poll_events`.
    #[pyo3(signature = (payload, volume = 1.0))]
    pub fn play_async(&mut self, payload: &[u8], volume: f32) -> PyResult<u64> {
        if !volume.is_finite() {
            return Err(PlayError::InvalidVolume(volume).into());
        }

        self.next_request += 1;
        let request = self.next_request;
        let payload = AudioPayload::from(payload);
        let output_rate = self.coordinator()?.output_rate();
        let loader_tx = self.loader_tx.clone();

        thread::spawn(move || {
            let result = decode(&payload).and_then(|buffer| match output_rate {
                Some(rate) => resample_to(&buffer, rate),
                None => Ok(buffer),
            });
            let _ = loader_tx.send(LoaderEvent::Decoded {
                request,
                volume,
                result,
            });
        });

        Ok(request)
    }

    /// Stop playback of all active voices.
    pub fn stop_all(&mut self) -> PyResult<()> {
        self.coordinator()?.stop_all(Instant::now());
        Ok(())
    }

    /// Fade all voices to silence over `duration_s` seconds, then stop them.
    ///
    /// Negative durations stop immediately.
    pub fn fade_all(&mut self, duration_s: f64) -> PyResult<()> {
        if !duration_s.is_finite() || duration_s > MAX_FADE_S {
            return Err(PyValueError::new_err(format!(
                "duration out of range: {duration_s}"
            )));
        }

        let duration = Duration::from_secs_f64(duration_s.max(0.0));
        self.coordinator()?.fade_all(duration, Instant::now());
        Ok(())
    }

    /// Set the master bus level (0.0 to 1.0).
    pub fn set_master_volume(&mut self, level: f32) -> PyResult<()> {
        Ok(self.coordinator()?.set_master_volume(level)?)
    }

    pub fn master_volume(&mut self) -> PyResult<f32> {
        Ok(self.coordinator()?.master_level())
    }

    pub fn active_voices(&mut self) -> PyResult<usize> {
        Ok(self.coordinator()?.active_voices())
    }

    /// Whether a fade is in progress.
    pub fn is_fading(&mut self) -> PyResult<bool> {
        Ok(self.coordinator()?.has_pending_fade())
    }

    /// Seconds until `poll_events` has scheduled work, if any.
    pub fn next_deadline_s(&mut self) -> PyResult<Option<f64>> {
        let now = Instant::now();
        Ok(self
            .coordinator()?
            .next_deadline()
            .map(|due| due.saturating_duration_since(now).as_secs_f64()))
    }

    /// Process pending work and return the next playback event.
    ///
    /// Returns `None` when no events are available.
    pub fn poll_events(&mut self, py: Python<'_>) -> PyResult<Option<Py<PyAny>>> {
        self.pump(Instant::now())?;

        let Some(event) = self.coordinator()?.take_event() else {
            return Ok(None);
        };

        let dict = PyDict::new(py);
        match event {
            PlaybackEvent::Started { request, voice } => {
                dict.set_item("type", "started")?;
                dict.set_item("request", request)?;
                dict.set_item("voice", voice)?;
            }
            PlaybackEvent::Failed { request, error } => {
                dict.set_item("type", "failed")?;
                dict.set_item("request", request)?;
                dict.set_item("msg", error)?;
            }
            PlaybackEvent::Ended { voice } => {
                dict.set_item("type", "ended")?;
                dict.set_item("voice", voice)?;
            }
            PlaybackEvent::Faded => {
                dict.set_item("type", "faded")?;
            }
        }

        Ok(Some(dict.into_any().unbind()))
    }

    /// Send a ping message to the audio thread.
    pub fn ping(&mut self) -> PyResult<()> {
        Ok(self.coordinator()?.ping()?)
    }

    /// Receive a message from the audio thread.
    pub fn receive_msg(&mut self) -> PyResult<Option<AudioMessage>> {
        Ok(self.coordinator()?.receive_message())
    }

    /// Stop everything and release the output device.
    pub fn shut_down(&mut self) -> PyResult<()> {
        self.coordinator()?.shut_down(Instant::now());
        Ok(())
    }
}
