//! Output Module
//!
//! This module owns the process-wide output resource:
//! - the [`OutputSink`] seam the coordinator talks to
//! - [`AudioOutput`], the CPAL implementation (stream, ring buffers, mixer)
//! - logger setup

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Stream, StreamConfig};
use env_logger::{Builder, Env};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::messages::{AudioMessage, ControlMessage};
use crate::playback::constants::{OUTPUT_BUFFER_FRAMES, RING_CAPACITY};
use crate::playback::errors::DeviceError;
use crate::playback::mixer::RtMixer;

/// What the coordinator needs from an output device.
pub trait OutputSink {
    /// Output channel count.
    fn channels(&self) -> usize;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Whether the device is currently rendering.
    fn is_running(&self) -> bool;

    /// Attempts to (re)start rendering.
    fn resume(&mut self) -> Result<(), DeviceError>;

    /// Queues a message for the audio thread.
    fn send(&mut self, message: ControlMessage) -> Result<(), DeviceError>;

    /// Takes the next message from the audio thread, if any.
    fn receive(&mut self) -> Option<AudioMessage>;
}

/// Opens an output with the master bus at the given level.
pub type OpenOutput<S> = fn(f32) -> Result<S, DeviceError>;

/// CPAL output stream with its message channels.
pub struct AudioOutput {
    stream: Stream,
    producer: Producer<ControlMessage>,
    consumer: Consumer<AudioMessage>,
    channels: usize,
    sample_rate: u32,
    playing: bool,
    healthy: Arc<AtomicBool>,
}

/// Setup and configure the logger for audio operations
pub fn setup_logger() {
    // Users can override via `RUST_LOG`, e.g. `RUST_LOG=debug` when troubleshooting.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init()
        .unwrap_or(()); // Ignore initialization errors
}

impl AudioOutput {
    /// Opens the default output device and starts rendering.
    ///
    /// This function:
    /// 1. Sets up the default audio device
    /// 2. Creates ring buffers for message passing
    /// 3. Initializes the mixer with the master bus at `master_level`
    /// 4. Builds and starts the stream
    pub fn open(master_level: f32) -> Result<Self, DeviceError> {
        setup_logger();

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(DeviceError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| DeviceError::Config(e.to_string()))?;
        let sample_rate = config.sample_rate();
        let channels = config.channels();

        log::info!(
            "Opening output... ({} ch@{} Hz, master {:.2})",
            channels,
            sample_rate,
            master_level
        );

        // Host -> audio thread
        let (producer_in, mut consumer_in) = RingBuffer::new(RING_CAPACITY);

        // Audio thread -> host
        let (mut producer_out, consumer_out) = RingBuffer::new(RING_CAPACITY);

        let mut mixer = RtMixer::new(channels as usize, sample_rate, master_level);

        let stream_config = StreamConfig {
            channels,
            sample_rate,
            buffer_size: BufferSize::Fixed(OUTPUT_BUFFER_FRAMES),
        };

        let healthy = Arc::new(AtomicBool::new(true));
        let healthy_cb = Arc::clone(&healthy);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut emit = |message: AudioMessage| {
                        let _ = producer_out.push(message);
                    };

                    while let Ok(message) = consumer_in.pop() {
                        mixer.apply(message, &mut emit);
                    }

                    mixer.render(data, &mut emit);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                    healthy_cb.store(false, Ordering::Release);
                },
                None,
            )
            .map_err(|e| DeviceError::Build(e.to_string()))?;

        stream
            .play()
            .map_err(|e| DeviceError::Play(e.to_string()))?;

        Ok(Self {
            stream,
            producer: producer_in,
            consumer: consumer_out,
            channels: channels as usize,
            sample_rate,
            playing: true,
            healthy,
        })
    }
}

impl OutputSink for AudioOutput {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_running(&self) -> bool {
        self.playing && self.healthy.load(Ordering::Acquire)
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        self.playing = false;
        self.stream
            .play()
            .map_err(|e| DeviceError::Play(e.to_string()))?;
        self.playing = true;
        self.healthy.store(true, Ordering::Release);
        log::info!("Output resumed");
        Ok(())
    }

    fn send(&mut self, message: ControlMessage) -> Result<(), DeviceError> {
        self.producer
            .push(message)
            .map_err(|_| DeviceError::BufferFull)
    }

    fn receive(&mut self) -> Option<AudioMessage> {
        self.consumer.pop().ok()
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        log::info!("Closing output");
    }
}
